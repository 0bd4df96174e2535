mod common;

use std::time::{Duration, Instant};

use common::{create_temp_db, create_test_db, user, Address, PartialUpdateUser, User};
use rust_sqlite_orm::{
    nullable,
    rusqlite::{params, OptionalExtension},
    Context, Error, Provider,
};

#[test]
fn test_basic_operations() {
    let db = create_test_db();
    let ctx = Context::background();

    // Insert a new user
    let mut alison = [user("Alison", 22, "MG")];
    db.insert(&ctx, &mut alison).unwrap();
    assert_ne!(alison[0].id, 0, "generated key is written back");

    // Query a user
    let mut found = User::default();
    db.query_one(&ctx, &mut found, "SELECT * FROM users WHERE id = ?", [alison[0].id])
        .unwrap();
    assert_eq!(found, alison[0]);

    // Update the user
    found.name = "Ali".to_string();
    db.update(&ctx, &[found.clone()]).unwrap();
    let mut updated = User::default();
    db.query_one(&ctx, &mut updated, "SELECT * FROM users WHERE id = ?", [found.id])
        .unwrap();
    assert_eq!(updated.name, "Ali");

    // Delete the user
    db.delete(&ctx, &[found.id]).unwrap();
    let err = db
        .query_one(&ctx, &mut User::default(), "SELECT * FROM users WHERE id = ?", [found.id])
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_insert_writes_json_payload() {
    let (db, raw, _file) = create_temp_db();
    let ctx = Context::background();

    let mut records = [user("Alison", 22, "MG")];
    db.insert(&ctx, &mut records).unwrap();

    let (name, age, address): (String, i32, Vec<u8>) = raw
        .query_row(
            "SELECT name, age, address FROM users WHERE id = ?",
            [records[0].id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(name, "Alison");
    assert_eq!(age, 22);
    assert_eq!(address, br#"{"state":"MG","city":""}"#.to_vec());
}

#[test]
fn test_decode_row_written_outside() {
    let (db, raw, _file) = create_temp_db();
    let ctx = Context::background();

    raw.execute(
        "INSERT INTO users (id, name, age, address) VALUES (?1, ?2, ?3, ?4)",
        params![5, "Cris", 28, br#"{"state":"SP","city":""}"#.to_vec()],
    )
    .unwrap();

    let mut cris = User::default();
    db.query_one(&ctx, &mut cris, "SELECT * FROM users WHERE name = ?", ["Cris"])
        .unwrap();
    assert_eq!(
        cris,
        User {
            id: 5,
            name: "Cris".to_string(),
            age: 28,
            address: Address {
                state: "SP".to_string(),
                city: String::new(),
            },
        }
    );
}

#[test]
fn test_partial_update_leaves_other_columns() {
    let (db, raw, _file) = create_temp_db();
    let ctx = Context::background();

    let mut records = [user("Cristina", 27, "SP")];
    db.insert(&ctx, &mut records).unwrap();
    let id = records[0].id;

    db.update(
        &ctx,
        &[PartialUpdateUser {
            id,
            age: nullable::int(28),
            ..Default::default()
        }],
    )
    .unwrap();

    let (name, age): (String, i32) = raw
        .query_row("SELECT name, age FROM users WHERE id = ?", [id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(name, "Cristina");
    assert_eq!(age, 28);

    let mut cris = User::default();
    db.query_one(&ctx, &mut cris, "SELECT * FROM users WHERE id = ?", [id])
        .unwrap();
    assert_eq!(cris.address.state, "SP");
}

#[test]
fn test_update_with_nothing_present_is_skipped() {
    let db = create_test_db();
    let ctx = Context::background();

    let mut records = [user("Bia", 30, "RJ")];
    db.insert(&ctx, &mut records).unwrap();

    db.update(
        &ctx,
        &[PartialUpdateUser {
            id: records[0].id,
            ..Default::default()
        }],
    )
    .unwrap();

    let mut bia = User::default();
    db.query_one(&ctx, &mut bia, "SELECT * FROM users WHERE id = ?", [records[0].id])
        .unwrap();
    assert_eq!(bia, records[0]);
}

#[test]
fn test_empty_inputs_are_noops() {
    let (db, raw, _file) = create_temp_db();
    let ctx = Context::background();

    db.insert::<User>(&ctx, &mut []).unwrap();
    db.update::<User>(&ctx, &[]).unwrap();
    db.delete::<i64>(&ctx, &[]).unwrap();

    let count: i64 = raw
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_multi_record_insert_and_query() {
    let db = create_test_db();
    let ctx = Context::background();

    let mut records = vec![
        user("Fernanda", 31, "BA"),
        user("Bia", 25, "RJ"),
        user("Cris", 28, "SP"),
    ];
    db.insert(&ctx, &mut records).unwrap();
    assert!(records.windows(2).all(|w| w[0].id < w[1].id));

    let mut users = vec![User::default()];
    db.query(&ctx, &mut users, "SELECT * FROM users ORDER BY id", [])
        .unwrap();
    assert_eq!(users, records);

    db.delete(&ctx, &[records[0].id, records[2].id]).unwrap();
    db.query(&ctx, &mut users, "SELECT * FROM users ORDER BY id", [])
        .unwrap();
    assert_eq!(users, vec![records[1].clone()]);
}

#[test]
fn test_mixed_column_sets_are_inserted_separately() {
    let (db, raw, _file) = create_temp_db();
    let ctx = Context::background();

    let mut records = [
        PartialUpdateUser {
            name: nullable::string("only name"),
            ..Default::default()
        },
        PartialUpdateUser {
            age: nullable::int(40),
            ..Default::default()
        },
        PartialUpdateUser {
            id: 100,
            name: nullable::string("explicit key"),
            ..Default::default()
        },
    ];
    db.insert(&ctx, &mut records).unwrap();
    assert_ne!(records[0].id, 0);
    assert_ne!(records[1].id, 0);
    assert_eq!(records[2].id, 100);

    let age: Option<i32> = raw
        .query_row("SELECT age FROM users WHERE id = ?", [records[0].id], |row| {
            row.get(0)
        })
        .optional()
        .unwrap()
        .flatten();
    assert_eq!(age, None);
}

#[test]
fn test_exec_and_driver_errors() {
    let db = create_test_db();
    let ctx = Context::background();

    let changed = db
        .exec(
            &ctx,
            "INSERT INTO users (name, age) VALUES (?, ?), (?, ?)",
            params!["a", 1, "b", 2],
        )
        .unwrap();
    assert_eq!(changed, 2);

    let err = db
        .exec(&ctx, "INSERT INTO missing_table (x) VALUES (1)", [])
        .unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
}

#[test]
fn test_canceled_context() {
    let db = create_test_db();
    let ctx = Context::background();
    ctx.cancel();

    let err = db.insert(&ctx, &mut [user("Late", 1, "AC")]).unwrap_err();
    assert!(matches!(err, Error::Canceled));

    let err = db
        .query(&ctx, &mut Vec::<User>::new(), "SELECT * FROM users", [])
        .unwrap_err();
    assert!(matches!(err, Error::Canceled));
}

#[test]
fn test_bad_json_column_fails_to_decode() {
    let db = create_test_db();
    let ctx = Context::background();
    db.exec(
        &ctx,
        "INSERT INTO users (id, name, age, address) VALUES (1, 'x', 1, 'not json')",
        [],
    )
    .unwrap();

    let err = db
        .query_one(&ctx, &mut User::default(), "SELECT * FROM users", [])
        .unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

#[test]
fn test_invalid_utf8_text_fails_to_decode() {
    let db = create_test_db();
    let ctx = Context::background();
    db.exec(
        &ctx,
        r#"INSERT INTO users (id, name, age, address)
           VALUES (1, CAST(x'ff61' AS TEXT), 1, '{"state":"MG","city":""}')"#,
        [],
    )
    .unwrap();

    let err = db
        .query_one(&ctx, &mut User::default(), "SELECT * FROM users", [])
        .unwrap_err();
    assert!(matches!(err, Error::Decode { ref column, .. } if column == "name"));
}

// Counting 100M generated rows takes far longer than the deadline.
const SLOW_COUNT: &str = concat!(
    "WITH RECURSIVE c(x) AS ",
    "(SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000)"
);

#[test]
fn test_deadline_interrupts_running_statement() {
    let db = create_test_db();

    let started = Instant::now();
    let err = db
        .exec(
            &Context::with_timeout(Duration::from_millis(50)),
            &format!("{SLOW_COUNT} INSERT INTO users (name) SELECT 'n' || count(*) FROM c"),
            [],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Canceled));
    assert!(started.elapsed() < Duration::from_secs(5));

    let started = Instant::now();
    let err = db
        .query_one(
            &Context::with_timeout(Duration::from_millis(50)),
            &mut User::default(),
            &format!("{SLOW_COUNT} SELECT count(*) AS age FROM c"),
            [],
        )
        .unwrap_err();
    assert!(matches!(err, Error::Canceled));
    assert!(started.elapsed() < Duration::from_secs(5));

    // The connection is usable again once the call has returned.
    let mut records = [user("After", 30, "PR")];
    db.insert(&Context::background(), &mut records).unwrap();
    assert_ne!(records[0].id, 0);
}

#[test]
fn test_large_insert_keeps_row_order_across_statements() {
    let db = create_test_db();
    let ctx = Context::background();

    // Three bound columns per row: more rows than one statement can carry.
    let mut records: Vec<User> = (0..12_000)
        .map(|i| user(&format!("user-{i}"), i, "MG"))
        .collect();
    db.insert(&ctx, &mut records).unwrap();

    for (idx, record) in records.iter().enumerate() {
        assert_eq!(record.id, idx as i64 + 1);
    }

    let mut stored = Vec::<User>::new();
    db.query(&ctx, &mut stored, "SELECT * FROM users ORDER BY id", [])
        .unwrap();
    assert_eq!(stored, records);
}

#[test]
fn test_delete_of_many_ids_is_batched() {
    let db = create_test_db();
    let ctx = Context::background();

    let mut far = user("Far", 50, "RS");
    far.id = 35_000;
    let mut records = [user("Kept", 20, "MG"), user("Gone", 21, "MG"), far];
    db.insert(&ctx, &mut records).unwrap();
    assert_eq!(records[0].id, 1);

    let ids: Vec<i64> = (2..=40_000).collect();
    db.delete(&ctx, &ids).unwrap();

    let mut remaining = Vec::<User>::new();
    db.query(&ctx, &mut remaining, "SELECT * FROM users", [])
        .unwrap();
    assert_eq!(remaining, vec![records[0].clone()]);
}
