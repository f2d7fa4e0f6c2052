mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err, request_ok, select_workspace, spawn_sidecar, str_field};

fn create_plan(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    class_id: &str,
    subject_id: &str,
    start: &str,
    end: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-05",
            "startTime": start,
            "endTime": end
        }}),
    );
    str_field(&created, "planId")
}

#[test]
fn plans_create_blocks_overlaps_and_allows_back_to_back() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "plannerd-plans-conflict");

    let class = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "7B" }),
    );
    let class_id = str_field(&class, "classId");
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "Mathematics" }),
    );
    let subject_id = str_field(&subject, "subjectId");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-02",
            "startTime": "09:00",
            "endTime": "10:00",
            "topic": "Fractions"
        }}),
    );
    let first_id = str_field(&first, "planId");
    assert_eq!(
        first.pointer("/plan/status").and_then(|v| v.as_str()),
        Some("planned")
    );

    // Touching boundary is legal.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-02",
            "startTime": "10:00",
            "endTime": "11:00"
        }}),
    );
    let second_id = str_field(&second, "planId");

    // Overlap is rejected and names the blocking plan.
    let conflict = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-02",
            "startTime": "09:30",
            "endTime": "10:30"
        }}),
    );
    assert_eq!(
        conflict.get("code").and_then(|v| v.as_str()),
        Some("schedule_conflict")
    );
    assert_eq!(
        conflict
            .pointer("/details/conflict/id")
            .and_then(|v| v.as_str()),
        Some(first_id.as_str())
    );

    // Same slot on another date is fine.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-03",
            "startTime": "09:30",
            "endTime": "10:30"
        }}),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "plans.list",
        json!({ "classId": class_id, "startDate": "2026-03-01", "endDate": "2026-03-07" }),
    );
    let plans = listed
        .get("plans")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(plans.len(), 3);
    assert_eq!(plans[0].get("id").and_then(|v| v.as_str()), Some(first_id.as_str()));
    assert_eq!(plans[1].get("id").and_then(|v| v.as_str()), Some(second_id.as_str()));
    assert_eq!(
        plans[2].get("date").and_then(|v| v.as_str()),
        Some("2026-03-03")
    );
}

#[test]
fn check_conflict_honours_exclude_and_cancelled_plans() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "plannerd-check-conflict");

    let class_id = str_field(
        &request_ok(&mut stdin, &mut reader, "1", "classes.create", json!({ "name": "8A" })),
        "classId",
    );
    let subject_id = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "subjects.create", json!({ "name": "History" })),
        "subjectId",
    );
    let plan_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "plans.create",
            json!({ "input": {
                "classId": class_id,
                "subjectId": subject_id,
                "date": "2026-03-04",
                "startTime": "09:00",
                "endTime": "10:00"
            }}),
        ),
        "planId",
    );

    let hit = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "plans.checkConflict",
        json!({
            "classId": class_id,
            "date": "2026-03-04",
            "startTime": "09:00",
            "endTime": "10:00"
        }),
    );
    assert_eq!(
        hit.pointer("/conflict/id").and_then(|v| v.as_str()),
        Some(plan_id.as_str())
    );

    let own = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "plans.checkConflict",
        json!({
            "classId": class_id,
            "date": "2026-03-04",
            "startTime": "09:00",
            "endTime": "10:00",
            "excludeId": plan_id
        }),
    );
    assert!(own.get("conflict").map(|v| v.is_null()).unwrap_or(false));

    let zero = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "plans.checkConflict",
        json!({
            "classId": class_id,
            "date": "2026-03-04",
            "startTime": "09:00",
            "endTime": "09:00"
        }),
    );
    assert_eq!(zero.get("code").and_then(|v| v.as_str()), Some("invalid_window"));

    let unknown_class = request_err(
        &mut stdin,
        &mut reader,
        "6b",
        "plans.checkConflict",
        json!({
            "classId": "no-such-class",
            "date": "2026-03-04",
            "startTime": "09:00",
            "endTime": "10:00"
        }),
    );
    assert_eq!(
        unknown_class.get("code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "plans.update",
        json!({ "planId": plan_id, "patch": { "status": "cancelled" } }),
    );
    let after_cancel = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "plans.checkConflict",
        json!({
            "classId": class_id,
            "date": "2026-03-04",
            "startTime": "09:00",
            "endTime": "10:00"
        }),
    );
    assert!(after_cancel.get("conflict").map(|v| v.is_null()).unwrap_or(false));

    // The cancelled record still exists.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "plans.open",
        json!({ "planId": plan_id }),
    );
    assert_eq!(
        opened.pointer("/plan/status").and_then(|v| v.as_str()),
        Some("cancelled")
    );
}

#[test]
fn plans_update_rechecks_without_self_collision() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "plannerd-plans-update");

    let class_id = str_field(
        &request_ok(&mut stdin, &mut reader, "1", "classes.create", json!({ "name": "9C" })),
        "classId",
    );
    let subject_id = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "subjects.create", json!({ "name": "Biology" })),
        "subjectId",
    );
    let a = create_plan(&mut stdin, &mut reader, "3", &class_id, &subject_id, "09:00", "10:00");
    let b = create_plan(&mut stdin, &mut reader, "4", &class_id, &subject_id, "10:00", "11:00");

    // Shrinking inside its own slot must not collide with itself.
    let shrunk = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "plans.update",
        json!({ "planId": a, "patch": { "startTime": "09:15", "endTime": "09:45", "homework": "p. 12" } }),
    );
    assert_eq!(
        shrunk.pointer("/plan/startTime").and_then(|v| v.as_str()),
        Some("09:15")
    );
    assert_eq!(
        shrunk.pointer("/plan/homework").and_then(|v| v.as_str()),
        Some("p. 12")
    );

    let blocked = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "plans.update",
        json!({ "planId": b, "patch": { "startTime": "09:30" } }),
    );
    assert_eq!(
        blocked.get("code").and_then(|v| v.as_str()),
        Some("schedule_conflict")
    );
    assert_eq!(
        blocked
            .pointer("/details/conflict/id")
            .and_then(|v| v.as_str()),
        Some(a.as_str())
    );

    let reversed = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "plans.update",
        json!({ "planId": b, "patch": { "endTime": "09:50" } }),
    );
    assert_eq!(
        reversed.get("code").and_then(|v| v.as_str()),
        Some("invalid_window")
    );

    // Rejected updates leave the stored plan untouched.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "plans.open",
        json!({ "planId": b }),
    );
    assert_eq!(
        opened.pointer("/plan/startTime").and_then(|v| v.as_str()),
        Some("10:00")
    );

    let unknown = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "plans.update",
        json!({ "planId": b, "patch": { "teacher": "x" } }),
    );
    assert_eq!(unknown.get("code").and_then(|v| v.as_str()), Some("bad_params"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "plans.delete",
        json!({ "planId": a }),
    );
    let gone = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "plans.open",
        json!({ "planId": a }),
    );
    assert_eq!(gone.get("code").and_then(|v| v.as_str()), Some("not_found"));

    // With the blocker deleted, the move goes through.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "plans.update",
        json!({ "planId": b, "patch": { "startTime": "09:30" } }),
    );
}

#[test]
fn plans_create_validates_references() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, "plannerd-plans-refs");

    let class_id = str_field(
        &request_ok(&mut stdin, &mut reader, "1", "classes.create", json!({ "name": "10A" })),
        "classId",
    );
    let missing_subject = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": "nope",
            "date": "2026-03-02",
            "startTime": "09:00",
            "endTime": "10:00"
        }}),
    );
    assert_eq!(
        missing_subject.get("code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let subject_id = str_field(
        &request_ok(&mut stdin, &mut reader, "3", "subjects.create", json!({ "name": "Art" })),
        "subjectId",
    );
    let bad_time = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-02",
            "startTime": "9am",
            "endTime": "10:00"
        }}),
    );
    assert_eq!(bad_time.get("code").and_then(|v| v.as_str()), Some("bad_params"));

    let bad_status = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "plans.create",
        json!({ "input": {
            "classId": class_id,
            "subjectId": subject_id,
            "date": "2026-03-02",
            "startTime": "09:00",
            "endTime": "10:00",
            "status": "maybe"
        }}),
    );
    assert_eq!(bad_status.get("code").and_then(|v| v.as_str()), Some("bad_params"));
}
