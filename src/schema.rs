diesel::table! {
    reservations (id) {
        id -> Integer,
        date -> Text,
        hour -> Text,
        reserved_by -> Text,
    }
}

diesel::table! {
    absences (id) {
        id -> Integer,
        name -> Text,
        date -> Text,
    }
}

diesel::table! {
    user_threads (user_id) {
        user_id -> Text,
        thread_id -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(reservations, absences, user_threads,);
