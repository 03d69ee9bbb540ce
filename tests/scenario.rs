//! End-to-end behavior of the mapping provider over the in-memory engine.

use pretty_assertions::assert_eq;
use qmap::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn employee() -> Type {
    Type::entity("Employee")
}

fn dto() -> Type {
    Type::entity("EmployeeDto")
}

fn config() -> MapperConfig {
    MapperConfig::new()
        .entity(
            "Employee",
            [("Id", Type::int()), ("FullName", Type::string()), ("Age", Type::int())],
        )
        .entity(
            "EmployeeDto",
            [("Id", Type::int()), ("Name", Type::string()), ("Age", Type::int())],
        )
        .map(TypeMap::new("Employee", "EmployeeDto").map_member("Name", MemberSource::member("FullName")))
}

fn row(id: i64, name: &str, age: i64) -> Value {
    Value::record(
        "Employee",
        [("Id", Value::Int(id)), ("FullName", name.into()), ("Age", Value::Int(age))],
    )
}

fn dto_row(id: i64, name: &str, age: i64) -> Value {
    Value::record(
        "EmployeeDto",
        [("Id", Value::Int(id)), ("Name", name.into()), ("Age", Value::Int(age))],
    )
}

fn source() -> Queryable {
    let data = InMemoryProvider::new()
        .collection("Employee", vec![row(1, "Ann", 30), row(2, "Bo", 17), row(3, "Cy", 22)]);
    Queryable::root(employee(), Arc::new(data))
}

fn provider() -> Arc<MappingProvider> {
    MappingProvider::builder(Arc::new(config()), source(), dto()).build_shared()
}

fn adult_dto() -> Lambda {
    Lambda::with("d", dto(), |d| d.member("Age", Type::int()).gt(Expr::constant(18)))
}

fn adult_employee() -> Lambda {
    Lambda::with("e", employee(), |e| e.member("Age", Type::int()).gt(Expr::constant(18)))
}

#[test]
fn filter_then_list_projects_lazily() {
    let query = provider().query().then(|q| q.filter(adult_dto()));
    let rows = query.to_list().unwrap();
    assert_eq!(rows, vec![dto_row(1, "Ann", 30), dto_row(3, "Cy", 22)]);
}

#[test]
fn any_with_predicate_runs_on_source() {
    let any = provider().query().execute(|q| q.any_where(adult_dto())).unwrap();
    assert_eq!(any, Value::Bool(true));

    let none = provider()
        .query()
        .execute(|q| {
            q.any_where(Lambda::with("d", dto(), |d| {
                d.member("Age", Type::int()).gt(Expr::constant(99))
            }))
        })
        .unwrap();
    assert_eq!(none, Value::Bool(false));
}

#[test]
fn parameter_overrides_captured_value() {
    let predicate = Lambda::with("d", dto(), |d| {
        d.member("Age", Type::int())
            .gt(Expr::captured("Closure", "threshold", 18))
    });

    let default = provider().query().then(|q| q.filter(predicate.clone()));
    assert_eq!(default.to_list().unwrap().len(), 2);

    let overridden = MappingProvider::builder(Arc::new(config()), source(), dto())
        .parameter("threshold", 25)
        .build_shared();
    let rows = overridden
        .query()
        .then(|q| q.filter(predicate))
        .to_list()
        .unwrap();
    assert_eq!(rows, vec![dto_row(1, "Ann", 30)]);
}

#[test]
fn select_of_member_passes_through() {
    let names = provider()
        .query()
        .then(|q| q.select(Lambda::with("d", dto(), |d| d.member("Name", Type::string()))))
        .to_list()
        .unwrap();
    assert_eq!(names, vec![Value::from("Ann"), Value::from("Bo"), Value::from("Cy")]);
}

#[test]
fn engine_failure_reaches_handler_once() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let provider = MappingProvider::builder(Arc::new(config()), source(), dto())
        .exception_handler(Arc::new(move |e: &MapError| {
            sink.lock().unwrap().push(e.clone());
        }))
        .build_shared();

    let query = provider.query().then(|q| {
        q.filter(Lambda::with("d", dto(), |d| {
            Expr::invoke("soundex", vec![d.member("Name", Type::string())], Type::bool())
        }))
    });
    let err = query.to_list().unwrap_err();

    assert!(matches!(err, MapError::NotSupported(_)));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], err);
}

#[test]
fn translation_failure_reaches_handler_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let config = config().map(
        TypeMap::new("Employee", "EmployeeDto")
            .map_member("Name", MemberSource::member("FullName"))
            .map_member("Age", MemberSource::Ignore),
    );
    let provider = MappingProvider::builder(Arc::new(config), source(), dto())
        .exception_handler(Arc::new(move |_: &MapError| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build_shared();

    let err = provider
        .query()
        .execute(|q| q.count_where(adult_dto()))
        .unwrap_err();
    assert!(matches!(err, MapError::Translation(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn reducers_agree_with_direct_source_queries() {
    let mapped = provider().query();
    let direct = source();

    assert_eq!(
        mapped.execute(|q| q.count()).unwrap(),
        direct.execute(|q| q.count()).unwrap()
    );
    assert_eq!(
        mapped.execute(|q| q.count_where(adult_dto())).unwrap(),
        direct.execute(|q| q.count_where(adult_employee())).unwrap()
    );
    assert_eq!(
        mapped.execute(|q| q.any_where(adult_dto())).unwrap(),
        direct.execute(|q| q.any_where(adult_employee())).unwrap()
    );
    assert_eq!(
        mapped
            .execute(|q| q.sum_by(Lambda::with("d", dto(), |d| d.member("Age", Type::int()))))
            .unwrap(),
        direct
            .execute(|q| q.sum_by(Lambda::with("e", employee(), |e| e.member("Age", Type::int()))))
            .unwrap()
    );
}

#[test]
fn first_with_predicate_is_mapped_to_destination() {
    let first = provider()
        .query()
        .execute(|q| {
            q.first_where(Lambda::with("d", dto(), |d| {
                d.member("Name", Type::string()).eq(Expr::constant("Cy"))
            }))
        })
        .unwrap();
    assert_eq!(first, dto_row(3, "Cy", 22));
}

#[test]
fn repeated_execution_gives_identical_results() {
    let provider = provider();
    let query = provider
        .query()
        .then(|q| q.filter(adult_dto()).order_by_desc(Lambda::with("d", dto(), |d| {
            d.member("Age", Type::int())
        })));
    let first = query.to_list().unwrap();
    let second = query.to_list().unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0], dto_row(1, "Ann", 30));
}

#[test]
fn translate_does_not_execute() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = MappingProvider::builder(Arc::new(config()), source(), dto())
        .enumeration_handler(Arc::new(move |_: &[Value]| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .build_shared();

    let translated = provider
        .translate(provider.dest_root().filter(adult_dto()))
        .unwrap();
    assert_eq!(translated.ty(), Type::query(employee()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    provider.query().to_list().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn null_navigation_is_propagated() {
    let config = MapperConfig::new()
        .null_propagation(true)
        .entity(
            "Employee",
            [
                ("Id", Type::int()),
                ("FullName", Type::string()),
                ("Manager", Type::entity("Employee")),
            ],
        )
        .entity(
            "EmployeeDto",
            [("Id", Type::int()), ("ManagerName", Type::string())],
        )
        .map(
            TypeMap::new("Employee", "EmployeeDto")
                .map_member("ManagerName", MemberSource::path("Manager.FullName").unwrap()),
        );
    let ann = Value::record(
        "Employee",
        [("Id", Value::Int(1)), ("FullName", "Ann".into()), ("Manager", Value::Null)],
    );
    let bo = Value::record(
        "Employee",
        [("Id", Value::Int(2)), ("FullName", "Bo".into()), ("Manager", ann.clone())],
    );
    let data = InMemoryProvider::new().collection("Employee", vec![ann, bo]);
    let source = Queryable::root(employee(), Arc::new(data));
    let provider = MappingProvider::builder(Arc::new(config), source, dto()).build_shared();

    let all = provider.query().to_list().unwrap();
    assert_eq!(all[0].field("ManagerName"), Some(&Value::Null));
    assert_eq!(all[1].field("ManagerName"), Some(&Value::from("Ann")));

    let managed_by_ann = provider
        .query()
        .then(|q| {
            q.filter(Lambda::with("d", dto(), |d| {
                d.member("ManagerName", Type::string()).eq(Expr::constant("Ann"))
            }))
        })
        .to_list()
        .unwrap();
    assert_eq!(managed_by_ann.len(), 1);
    assert_eq!(managed_by_ann[0].field("Id"), Some(&Value::Int(2)));
}

#[test]
fn config_from_toml_drives_the_provider() {
    let config = MapperConfig::from_toml_str(
        r#"
        [[entities]]
        name = "Employee"
        fields = { Id = "int", FullName = "string", Age = "int" }

        [[entities]]
        name = "EmployeeDto"
        fields = { Id = "int", Name = "string", Age = "int" }

        [[maps]]
        source = "Employee"
        destination = "EmployeeDto"
        members = { Name = "FullName" }
        "#,
    )
    .unwrap();
    assert!(config.validate().is_empty());

    let provider = MappingProvider::builder(Arc::new(config), source(), dto()).build_shared();
    let count = provider.query().execute(|q| q.count_where(adult_dto())).unwrap();
    assert_eq!(count, Value::Int(2));
}

#[test]
fn member_of_reduced_element_executes_on_source() {
    let name = provider()
        .query()
        .execute(|q| {
            q.order_by(Lambda::with("d", dto(), |d| d.member("Name", Type::string())))
                .first()
                .member("Name", Type::string())
        })
        .unwrap();
    assert_eq!(name, Value::from("Ann"));
}

#[test]
fn partial_initializer_leaves_other_members_null() {
    let rows = provider()
        .query()
        .then(|q| {
            q.select(Lambda::with("d", dto(), |d| {
                Expr::new_object(dto(), vec![("Name", d.member("Name", Type::string()))])
            }))
        })
        .to_list()
        .unwrap();
    let partial = |name: &str| {
        Value::record(
            "EmployeeDto",
            [("Id", Value::Null), ("Name", name.into()), ("Age", Value::Null)],
        )
    };
    assert_eq!(rows, vec![partial("Ann"), partial("Bo"), partial("Cy")]);
}
