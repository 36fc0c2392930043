diesel::table! {
    captain_profiles (id) {
        id -> Uuid,
        user_id -> Uuid,
        display_name -> Varchar,
        phone -> Nullable<Varchar>,
        bio -> Nullable<Text>,
        experience_years -> Nullable<Int4>,
        avatar_url -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    captain_videos (id) {
        id -> Uuid,
        owner_id -> Uuid,
        original_url -> Text,
        blob_key -> Text,
        process_status -> Varchar,
        ready_720p_url -> Nullable<Text>,
        thumbnail_url -> Nullable<Text>,
        processed_duration_sec -> Nullable<Float8>,
        error_message -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    charter_drafts (id) {
        id -> Uuid,
        user_id -> Uuid,
        status -> Varchar,
        version -> Int4,
        current_step -> Int4,
        form_version -> Int4,
        data -> Jsonb,
        last_touched_at -> Timestamp,
        updated_at -> Timestamp,
        created_at -> Timestamp,
    }
}

diesel::table! {
    charter_media (id) {
        id -> Uuid,
        charter_id -> Varchar,
        kind -> Varchar,
        url -> Text,
        storage_key -> Text,
        sort_order -> Int4,
        thumbnail_url -> Nullable<Text>,
        duration_seconds -> Nullable<Float8>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    charters (id) {
        id -> Uuid,
        owner_id -> Uuid,
        captain_profile_id -> Uuid,
        name -> Varchar,
        status -> Varchar,
        data -> Jsonb,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    pending_media (id) {
        id -> Uuid,
        status -> Varchar,
        kind -> Varchar,
        original_key -> Text,
        original_url -> Text,
        final_key -> Nullable<Text>,
        final_url -> Nullable<Text>,
        thumbnail_key -> Nullable<Text>,
        thumbnail_url -> Nullable<Text>,
        size_bytes -> Nullable<Int8>,
        mime_type -> Nullable<Varchar>,
        correlation_id -> Nullable<Varchar>,
        error -> Nullable<Text>,
        owner_id -> Uuid,
        charter_id -> Nullable<Varchar>,
        duration_seconds -> Nullable<Float8>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(charters -> captain_profiles (captain_profile_id));

diesel::allow_tables_to_appear_in_same_query!(
    captain_profiles,
    captain_videos,
    charter_drafts,
    charter_media,
    charters,
    pending_media,
);
