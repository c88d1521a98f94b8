//! Field-level security through save and fetch.

use fjorddb::{
    error::Error,
    kv::MemoryDatabase,
    record::{AuthContext, RecordKind, SecurityError},
    test_support::Employee,
    txn::{AdminCapability, RecordDatabase},
};
use std::sync::Arc;

fn employee() -> Employee {
    Employee {
        id: "e1".into(),
        name: "Kari".into(),
        dept: "eng".into(),
        email: "kari@fjord.example".into(),
        salary: 90_000,
    }
}

#[tokio::test]
async fn restricted_field_updates_require_the_role() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));

    // Seed through the hr context; the initial salary is a restricted write.
    let hr = database.context_with_auth(AuthContext::new("ingrid", &["hr"]));
    hr.insert(employee()).await.expect("queue");
    hr.save().await.expect("seed");

    // A plain employee may change unrestricted fields...
    let staff = database.context_with_auth(AuthContext::new("kari", &["employee"]));
    let mut renamed = employee();
    renamed.name = "Kari N.".into();
    staff.insert(renamed).await.expect("queue");
    staff.save().await.expect("unrestricted update");

    // ...but a salary change by the same auth fails with the field named.
    let mut raise = employee();
    raise.name = "Kari N.".into();
    raise.salary = 120_000;
    staff.insert(raise.clone()).await.expect("queue");
    let err = staff.save().await.expect_err("restricted");
    assert!(matches!(
        err,
        Error::Security(SecurityError::WriteNotAllowed { ref record_type, ref fields })
            if record_type == "Employee" && fields == &vec!["salary".to_string()]
    ));
    staff.rollback();

    // The same update by hr succeeds.
    hr.insert(raise).await.expect("queue");
    hr.save().await.expect("hr update");

    // A subsequent fetch through the employee auth masks the salary.
    let masked: Employee = staff
        .fetch(&employee().primary_key())
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(masked.salary, 0);
    assert_eq!(masked.name, "Kari N.");

    // hr reads the real value.
    let visible: Employee = hr
        .fetch(&employee().primary_key())
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(visible.salary, 120_000);
}

#[tokio::test]
async fn anonymous_writers_cannot_touch_restricted_fields() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));
    let anonymous = database.context();

    let err = anonymous
        .insert(employee())
        .await
        .and(anonymous.save().await.map(|_| ()))
        .expect_err("anonymous salary write");
    assert!(matches!(err, Error::Security(_)));
}

#[tokio::test]
async fn admin_bypasses_field_security() {
    let database = RecordDatabase::new(Arc::new(MemoryDatabase::new()));
    let admin = database.admin_context();

    admin.insert(employee()).await.expect("queue");
    admin.save().await.expect("admin write");

    let visible: Employee = admin
        .fetch(&employee().primary_key())
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(visible.salary, 90_000);
}
