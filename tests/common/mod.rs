#![allow(dead_code)]

use std::time::Duration;

use rust_sqlite_orm::{
    record,
    rusqlite::{self, Connection},
    Config, Database, Nullable,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub state: String,
    pub city: String,
}

record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct User {
        #[column = "id"]
        pub id: i64,
        #[column = "name"]
        pub name: String,
        #[column = "age"]
        pub age: i32,
        #[column = "address,json"]
        pub address: Address,
    }
}

record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct PartialUpdateUser {
        #[column = "id"]
        pub id: i64,
        #[column = "name"]
        pub name: Nullable<String>,
        #[column = "age"]
        pub age: Nullable<i32>,
        #[column = "address,json"]
        pub address: Nullable<Address>,
    }
}

pub fn user(name: &str, age: i32, state: &str) -> User {
    User {
        id: 0,
        name: name.to_string(),
        age,
        address: Address {
            state: state.to_string(),
            city: String::new(),
        },
    }
}

// BLOB is the column type SQLite uses for the JSON payloads.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT,
            age INTEGER,
            address BLOB
        );
        "#,
    )
}

// In-memory database holding an empty `users` table.
pub fn create_test_db() -> Database {
    let conn = Connection::open_in_memory().unwrap();
    initialize_schema(&conn).unwrap();
    Database::from_connection(conn, "users")
}

// File-backed database plus a second raw connection for checking what was written.
pub fn create_temp_db() -> (Database, Connection, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();

    let raw = Connection::open(&path).unwrap();
    initialize_schema(&raw).unwrap();

    let config = Config::new(path, "users").with_busy_timeout(Duration::from_secs(5));
    let db = Database::open(config).unwrap();
    (db, raw, temp_file)
}
