// Written to match the table created in `Database::init_schema`.

diesel::table! {
    database_structure (id) {
        id -> BigInt,
        structure -> Text,
        database_connection_id -> BigInt,
        deleted -> Bool,
    }
}
