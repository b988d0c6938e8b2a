// ctxstore schema - project knowledge tables for Diesel ORM

diesel::table! {
    schema_versions (id) {
        id -> Integer,
        version -> Text,
        name -> Text,
        features -> Text,
        introduced_at -> Text,
    }
}

// ============================================================================
// Knowledge Tables
// ============================================================================

diesel::table! {
    project_contexts (id) {
        id -> Integer,
        project_name -> Text,
        context_type -> Text,
        content -> Text,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    conversation_history (id) {
        id -> Integer,
        project_name -> Text,
        conversation_id -> Text,
        message_type -> Text,
        content -> Text,
        metadata_json -> Text,
        sent_at -> Text,
    }
}

diesel::table! {
    file_history (id) {
        id -> Integer,
        project_name -> Text,
        file_path -> Text,
        version_number -> Integer,
        content -> Text,
        checksum -> Text,
        file_size -> BigInt,
        author -> Text,
        commit_hash -> Nullable<Text>,
        change_description -> Nullable<Text>,
        metadata_json -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    project_documentation (id) {
        id -> Integer,
        project_name -> Text,
        doc_type -> Text,
        title -> Text,
        content -> Text,
        format -> Text,
        version -> Nullable<Text>,
        author -> Nullable<Text>,
        tags_json -> Text,
        is_published -> Bool,
        external_url -> Nullable<Text>,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

// ============================================================================
// Team Tables
// ============================================================================

diesel::table! {
    project_users (id) {
        id -> Integer,
        project_name -> Text,
        username -> Text,
        email -> Text,
        role -> Text,
        permissions_json -> Text,
        is_active -> Bool,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
        last_active -> Text,
    }
}

diesel::table! {
    project_tasks (id) {
        id -> Integer,
        project_name -> Text,
        task_id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        status -> Text,
        priority -> Text,
        task_type -> Text,
        assignee -> Nullable<Text>,
        reporter -> Nullable<Text>,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    project_activity_logs (id) {
        id -> Integer,
        project_name -> Text,
        activity_type -> Text,
        actor -> Text,
        target -> Text,
        action -> Text,
        details -> Nullable<Text>,
        ip_address -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        metadata_json -> Text,
        occurred_at -> Text,
    }
}

// ============================================================================
// Project Operations Tables
// ============================================================================

diesel::table! {
    project_dependencies (id) {
        id -> Integer,
        project_name -> Text,
        package_name -> Text,
        version -> Text,
        package_manager -> Text,
        dependency_type -> Text,
        license -> Nullable<Text>,
        description -> Nullable<Text>,
        is_active -> Bool,
        metadata_json -> Text,
        installed_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    project_environments (id) {
        id -> Integer,
        project_name -> Text,
        environment_name -> Text,
        config_key -> Text,
        config_value -> Text,
        is_sensitive -> Bool,
        description -> Nullable<Text>,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    project_builds (id) {
        id -> Integer,
        project_name -> Text,
        build_number -> Text,
        build_type -> Text,
        status -> Text,
        branch_name -> Nullable<Text>,
        commit_hash -> Nullable<Text>,
        triggered_by -> Nullable<Text>,
        test_results_json -> Text,
        metadata_json -> Text,
        start_time -> Text,
        end_time -> Nullable<Text>,
        duration_seconds -> Nullable<Integer>,
        logs -> Nullable<Text>,
        updated_at -> Text,
    }
}

// ============================================================================
// Codebase Structure Tables
// ============================================================================

diesel::table! {
    project_components (id) {
        id -> Integer,
        project_name -> Text,
        component_name -> Text,
        component_type -> Text,
        file_path -> Nullable<Text>,
        description -> Nullable<Text>,
        version -> Nullable<Text>,
        is_active -> Bool,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    component_relationships (id) {
        id -> Integer,
        project_name -> Text,
        source_component -> Text,
        target_component -> Text,
        relationship_type -> Text,
        strength -> Double,
        description -> Nullable<Text>,
        is_directed -> Bool,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    file_metadata (id) {
        id -> Integer,
        project_name -> Text,
        file_path -> Text,
        file_name -> Text,
        file_extension -> Nullable<Text>,
        file_size -> Nullable<BigInt>,
        file_type -> Nullable<Text>,
        language -> Nullable<Text>,
        line_count -> Nullable<Integer>,
        last_author -> Nullable<Text>,
        checksum -> Nullable<Text>,
        is_binary -> Bool,
        is_generated -> Bool,
        last_modified -> Text,
        metadata_json -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}
