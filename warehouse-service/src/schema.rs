diesel::table! {
    products (id) {
        id -> Int4,
        code -> Varchar,
        name -> Varchar,
        size -> Int4,
        count -> Int4,
    }
}

diesel::table! {
    storages (id) {
        id -> Int4,
        name -> Varchar,
        available -> Bool,
    }
}

diesel::table! {
    reservations (storage_id, product_id) {
        storage_id -> Int4,
        product_id -> Int4,
    }
}

diesel::joinable!(reservations -> products (product_id));
diesel::joinable!(reservations -> storages (storage_id));

diesel::allow_tables_to_appear_in_same_query!(
    products,
    storages,
    reservations,
);
