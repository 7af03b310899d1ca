// Tables of the embedded SQLite vector index. Created at open time by `SqliteBackend`.

diesel::table! {
    indexes (name) {
        name -> Text,
        dimension -> Integer,
        created_at -> Timestamp,
    }
}

diesel::table! {
    chunks (id) {
        id -> Text,
        index_name -> Text,
        document_id -> Text,
        chunk_index -> Integer,
        text -> Text,
        embedding -> Binary,
        created_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(indexes, chunks);
