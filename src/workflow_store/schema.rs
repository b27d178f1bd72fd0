//! SQLite schema for the workflow database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Contracts, submitters, ledger, notifications, alerts, pipeline
// =============================================================================

const CONTRACTS_TABLE_V1: Table = Table {
    name: "contracts",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("template_ref", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("ordering_mode", &SqlType::Text, non_null = true),
        sqlite_column!("submission_id", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("sent_at", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("expires_at", &SqlType::Integer),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_contracts_status_updated", "status, updated_at")],
    unique_constraints: &[],
};

const CONTRACT_FK: ForeignKey = ForeignKey {
    foreign_table: "contracts",
    foreign_column: "id",
    cascade_on_delete: true,
};

const SUBMITTERS_TABLE_V1: Table = Table {
    name: "submitters",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "contract_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&CONTRACT_FK)
        ),
        sqlite_column!("external_id", &SqlType::Text),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!("signing_order", &SqlType::Integer),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("signing_url", &SqlType::Text),
        sqlite_column!("notified_at", &SqlType::Integer),
        sqlite_column!("opened_at", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_submitters_contract", "contract_id"),
        ("idx_submitters_external_id", "external_id"),
    ],
    unique_constraints: &[&["contract_id", "email"]],
};

const INBOUND_EVENTS_TABLE_V1: Table = Table {
    name: "inbound_events",
    columns: &[
        sqlite_column!("event_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("event_type", &SqlType::Text, non_null = true),
        sqlite_column!("received_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const NOTIFICATION_ATTEMPTS_TABLE_V1: Table = Table {
    name: "notification_attempts",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("submitter_id", &SqlType::Text),
        sqlite_column!("contract_id", &SqlType::Text),
        sqlite_column!("recipient", &SqlType::Text, non_null = true),
        sqlite_column!("channel", &SqlType::Text, non_null = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("subject", &SqlType::Text, non_null = true),
        sqlite_column!(
            "attempt_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("last_error", &SqlType::Text),
        sqlite_column!("provider_message_id", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_notification_attempts_status", "status"),
        ("idx_notification_attempts_submitter", "submitter_id"),
    ],
    unique_constraints: &[],
};

const ALERT_RULES_TABLE_V1: Table = Table {
    name: "alert_rules",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("metric", &SqlType::Text, non_null = true),
        sqlite_column!("operator", &SqlType::Text, non_null = true),
        sqlite_column!("threshold", &SqlType::Real, non_null = true),
        sqlite_column!("cooldown_secs", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "enabled",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!("recipient", &SqlType::Text),
        sqlite_column!("last_triggered_at", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const ALERT_RULE_FK: ForeignKey = ForeignKey {
    foreign_table: "alert_rules",
    foreign_column: "id",
    cascade_on_delete: true,
};

const ALERT_TRIGGERS_TABLE_V1: Table = Table {
    name: "alert_triggers",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "rule_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ALERT_RULE_FK)
        ),
        sqlite_column!("metric_value", &SqlType::Real, non_null = true),
        sqlite_column!("threshold", &SqlType::Real, non_null = true),
        sqlite_column!("triggered_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_alert_triggers_rule", "rule_id, triggered_at")],
    unique_constraints: &[],
};

const PIPELINE_ENTITIES_TABLE_V1: Table = Table {
    name: "pipeline_entities",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("stage", &SqlType::Text, non_null = true),
        sqlite_column!(
            "version",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("stage_entered_at", &SqlType::Integer, non_null = true),
        sqlite_column!("contract_id", &SqlType::Text),
        sqlite_column!("owner_email", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_pipeline_entities_stage", "stage")],
    unique_constraints: &[],
};

const PIPELINE_RULES_TABLE_V1: Table = Table {
    name: "pipeline_rules",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("from_stage", &SqlType::Text, non_null = true),
        sqlite_column!("to_stage", &SqlType::Text, non_null = true),
        sqlite_column!("condition", &SqlType::Text, non_null = true),
        sqlite_column!(
            "position",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "enabled",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    indices: &[("idx_pipeline_rules_from", "from_stage, position")],
    unique_constraints: &[],
};

const PIPELINE_ENTITY_FK: ForeignKey = ForeignKey {
    foreign_table: "pipeline_entities",
    foreign_column: "id",
    cascade_on_delete: true,
};

const PIPELINE_TRANSITIONS_TABLE_V1: Table = Table {
    name: "pipeline_transitions",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "entity_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PIPELINE_ENTITY_FK)
        ),
        sqlite_column!("from_stage", &SqlType::Text, non_null = true),
        sqlite_column!("to_stage", &SqlType::Text, non_null = true),
        sqlite_column!("rule_id", &SqlType::Integer),
        sqlite_column!("transitioned_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_pipeline_transitions_entity", "entity_id")],
    unique_constraints: &[],
};

pub const WORKFLOW_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        CONTRACTS_TABLE_V1,
        SUBMITTERS_TABLE_V1,
        INBOUND_EVENTS_TABLE_V1,
        NOTIFICATION_ATTEMPTS_TABLE_V1,
        ALERT_RULES_TABLE_V1,
        ALERT_TRIGGERS_TABLE_V1,
        PIPELINE_ENTITIES_TABLE_V1,
        PIPELINE_RULES_TABLE_V1,
        PIPELINE_TRANSITIONS_TABLE_V1,
    ],
    migration: None,
}];
