//! Definitions of every CRUD resource.

use super::{FieldDef as F, FieldKind::*, ResourceDef};
use crate::models::role::Permission;

const HAZARDOUS_EVENT_STATUS: &[&str] = &["forecasted", "ongoing", "passed"];
const YES_NO_UNKNOWN: &[&str] = &["yes", "no", "unknown"];
const HUMAN_EFFECT_CATEGORIES: &[&str] = &[
    "deaths",
    "injured",
    "missing",
    "affected_direct",
    "affected_indirect",
    "displaced",
];
const SEX: &[&str] = &["m", "f", "other"];

pub static HAZARDOUS_EVENTS: ResourceDef = ResourceDef {
    name: "hazardous-events",
    label: "Hazardous event",
    table: "hazardous_events",
    fields: &[
        F::new("api_import_id", Text),
        F::new("hip_type_id", Text),
        F::new("hip_cluster_id", Text),
        F::new("hip_hazard_id", Text),
        F::new("national_specification", Text),
        F::new("start_date", Date),
        F::new("end_date", Date),
        F::new("description", Text),
        F::new("chains_explanation", Text),
        F::new("magnitude", Text),
        F::new("hazardous_event_status", Enum(HAZARDOUS_EVENT_STATUS)),
        F::new("data_source", Text),
        F::new("record_originator", Text).required(),
        F::new("spatial_footprint", Json),
        F::new("attachments", Json),
    ],
    has_approval: true,
    date_range: Some(("start_date", "end_date")),
    has_hip: true,
    has_event_parent: true,
    search_column: Some("description"),
    order_by: "start_date DESC NULLS LAST, id",
    edit_permission: Permission::EditData,
};

pub static DISASTER_EVENTS: ResourceDef = ResourceDef {
    name: "disaster-events",
    label: "Disaster event",
    table: "disaster_events",
    fields: &[
        F::new("api_import_id", Text),
        F::new("hazardous_event_id", Ref("hazardous_events")),
        F::new("disaster_event_id", Ref("disaster_events")),
        F::new("national_disaster_id", Text),
        F::new("other_id1", Text),
        F::new("glide", Text),
        F::new("name_national", Text),
        F::new("name_global_or_regional", Text),
        F::new("start_date", Date),
        F::new("end_date", Date),
        F::new("start_date_local", Text),
        F::new("end_date_local", Text),
        F::new("duration_days", Int),
        F::new("disaster_declaration", Enum(YES_NO_UNKNOWN)),
        F::new("disaster_declaration_type_and_effect", Text),
        F::new("disaster_declaration_date", Timestamp),
        F::new("had_official_warning_or_weather_advisory", Bool),
        F::new("official_warning_affected_areas", Text),
        F::new("response_cost_total", Money),
        F::new("response_cost_currency", Text),
        F::new("hip_type_id", Text),
        F::new("hip_cluster_id", Text),
        F::new("hip_hazard_id", Text),
        F::new("data_source", Text),
        F::new("record_originator", Text),
        F::new("spatial_footprint", Json),
        F::new("attachments", Json),
    ],
    has_approval: true,
    date_range: Some(("start_date", "end_date")),
    has_hip: true,
    has_event_parent: false,
    search_column: Some("name_national"),
    order_by: "start_date DESC NULLS LAST, id",
    edit_permission: Permission::EditData,
};

pub static DISASTER_RECORDS: ResourceDef = ResourceDef {
    name: "disaster-records",
    label: "Disaster record",
    table: "disaster_records",
    fields: &[
        F::new("api_import_id", Text),
        F::new("disaster_event_id", Ref("disaster_events")),
        F::new("location_desc", Text),
        F::new("start_date", Date),
        F::new("end_date", Date),
        F::new("local_warn_inst", Text),
        F::new("primary_data_source", Text),
        F::new("other_data_source", Text),
        F::new("field_assess_date", Timestamp),
        F::new("assessment_modes", Text),
        F::new("originator_recorder_inst", Text).required(),
        F::new("validated_by", Text),
        F::new("checked_by", Text),
        F::new("data_collector", Text),
        F::new("hip_type_id", Text),
        F::new("hip_cluster_id", Text),
        F::new("hip_hazard_id", Text),
        F::new("legacy_data", Json),
        F::new("spatial_footprint", Json),
        F::new("attachments", Json),
    ],
    has_approval: true,
    date_range: Some(("start_date", "end_date")),
    has_hip: true,
    has_event_parent: false,
    search_column: Some("location_desc"),
    order_by: "start_date DESC NULLS LAST, id",
    edit_permission: Permission::EditData,
};

pub static DAMAGES: ResourceDef = ResourceDef {
    name: "damages",
    label: "Damage",
    table: "damages",
    fields: &[
        F::new("api_import_id", Text),
        F::new("record_id", Ref("disaster_records")).required(),
        F::new("sector_id", Ref("sectors")).required(),
        F::new("asset_id", Ref("assets")).required(),
        F::new("unit", Text),
        F::new("total_damage_amount", Int),
        F::new("total_damage_amount_override", Bool),
        F::new("pd_damage_amount", Int),
        F::new("pd_repair_cost_unit", Money),
        F::new("pd_repair_cost_total", Money),
        F::new("td_damage_amount", Int),
        F::new("td_replacement_cost_unit", Money),
        F::new("td_replacement_cost_total", Money),
        F::new("total_repair_replacement", Money),
        F::new("total_recovery", Money),
        F::new("currency", Text),
        F::new("spatial_footprint", Json),
        F::new("attachments", Json),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: None,
    order_by: "created_at, id",
    edit_permission: Permission::EditData,
};

pub static LOSSES: ResourceDef = ResourceDef {
    name: "losses",
    label: "Loss",
    table: "losses",
    fields: &[
        F::new("api_import_id", Text),
        F::new("record_id", Ref("disaster_records")).required(),
        F::new("sector_id", Ref("sectors")).required(),
        F::new("sector_is_agriculture", Bool),
        F::new("type_not_agriculture", Text),
        F::new("type_agriculture", Text),
        F::new("related_to_not_agriculture", Text),
        F::new("description", Text),
        F::new("public_unit", Text),
        F::new("public_units", Int),
        F::new("public_cost_unit", Money),
        F::new("public_cost_unit_currency", Text),
        F::new("public_cost_total", Money),
        F::new("private_unit", Text),
        F::new("private_units", Int),
        F::new("private_cost_unit", Money),
        F::new("private_cost_unit_currency", Text),
        F::new("private_cost_total", Money),
        F::new("spatial_footprint", Json),
        F::new("attachments", Json),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("description"),
    order_by: "created_at, id",
    edit_permission: Permission::EditData,
};

pub static DISRUPTIONS: ResourceDef = ResourceDef {
    name: "disruptions",
    label: "Disruption",
    table: "disruptions",
    fields: &[
        F::new("api_import_id", Text),
        F::new("record_id", Ref("disaster_records")).required(),
        F::new("sector_id", Ref("sectors")).required(),
        F::new("duration_days", Int),
        F::new("duration_hours", Int),
        F::new("users_affected", Int),
        F::new("people_affected", Int),
        F::new("comment", Text),
        F::new("response_operation", Text),
        F::new("response_cost", Money),
        F::new("response_currency", Text),
        F::new("spatial_footprint", Json),
        F::new("attachments", Json),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("comment"),
    order_by: "created_at, id",
    edit_permission: Permission::EditData,
};

pub static HUMAN_EFFECTS: ResourceDef = ResourceDef {
    name: "human-effects",
    label: "Human effect",
    table: "human_effects",
    fields: &[
        F::new("api_import_id", Text),
        F::new("record_id", Ref("disaster_records")).required(),
        F::new("category", Enum(HUMAN_EFFECT_CATEGORIES)).required(),
        F::new("sex", Enum(SEX)),
        F::new("age", Text),
        F::new("disability", Text),
        F::new("global_poverty_line", Text),
        F::new("national_poverty_line", Text),
        F::new("custom", Json),
        F::new("count", Int).required(),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: None,
    order_by: "created_at, id",
    edit_permission: Permission::EditData,
};

pub static NONECO_LOSSES: ResourceDef = ResourceDef {
    name: "noneco-losses",
    label: "Non-economic loss",
    table: "noneco_losses",
    fields: &[
        F::new("api_import_id", Text),
        F::new("record_id", Ref("disaster_records")).required(),
        F::new("category", Text).required(),
        F::new("description", Text).required(),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("description"),
    order_by: "created_at, id",
    edit_permission: Permission::EditData,
};

/// Which sectors a disaster record affected, with sector-level totals.
pub static SECTOR_RECORD_RELATIONS: ResourceDef = ResourceDef {
    name: "sector-disaster-record-relations",
    label: "Sector relation",
    table: "sector_disaster_records_relation",
    fields: &[
        F::new("api_import_id", Text),
        F::new("record_id", Ref("disaster_records")).required(),
        F::new("sector_id", Ref("sectors")).required(),
        F::new("with_damage", Bool),
        F::new("damage_cost", Money),
        F::new("damage_cost_currency", Text),
        F::new("damage_recovery_cost", Money),
        F::new("damage_recovery_cost_currency", Text),
        F::new("with_disruption", Bool),
        F::new("with_losses", Bool),
        F::new("losses_cost", Money),
        F::new("losses_cost_currency", Text),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: None,
    order_by: "created_at, id",
    edit_permission: Permission::EditData,
};

pub static ASSETS: ResourceDef = ResourceDef {
    name: "assets",
    label: "Asset",
    table: "assets",
    fields: &[
        F::new("api_import_id", Text),
        F::new("name", Text).required(),
        F::new("sector_id", Ref("sectors")),
        F::new("category", Text),
        F::new("national_id", Text),
        F::new("notes", Text),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("name"),
    order_by: "name, id",
    edit_permission: Permission::EditData,
};

pub static SECTORS: ResourceDef = ResourceDef {
    name: "sectors",
    label: "Sector",
    table: "sectors",
    fields: &[
        F::new("name", Translated).required(),
        F::new("parent_id", Ref("sectors")),
        F::new("description", Text),
        F::new("level", Int),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("name"),
    order_by: "level NULLS FIRST, id",
    edit_permission: Permission::ManageCountrySettings,
};

pub static ORGANIZATIONS: ResourceDef = ResourceDef {
    name: "organizations",
    label: "Organization",
    table: "organizations",
    fields: &[
        F::new("name", Text).required(),
        F::new("description", Text),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("name"),
    order_by: "name, id",
    edit_permission: Permission::ManageOrganizations,
};

pub static DIVISIONS: ResourceDef = ResourceDef {
    name: "divisions",
    label: "Division",
    table: "divisions",
    fields: &[
        F::new("import_id", Text),
        F::new("national_id", Text),
        F::new("parent_id", Ref("divisions")),
        F::new("name", Translated).required(),
        F::new("level", Int),
        F::new("geojson", Json),
    ],
    has_approval: false,
    date_range: None,
    has_hip: false,
    has_event_parent: false,
    search_column: Some("name"),
    order_by: "level NULLS FIRST, id",
    edit_permission: Permission::ManageCountrySettings,
};

/// Every resource exposed under `/api/v1`.
pub static ALL: &[&ResourceDef] = &[
    &HAZARDOUS_EVENTS,
    &DISASTER_EVENTS,
    &DISASTER_RECORDS,
    &DAMAGES,
    &LOSSES,
    &DISRUPTIONS,
    &HUMAN_EFFECTS,
    &NONECO_LOSSES,
    &SECTOR_RECORD_RELATIONS,
    &ASSETS,
    &SECTORS,
    &ORGANIZATIONS,
    &DIVISIONS,
];
