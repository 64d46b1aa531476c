//! Hierarchy endpoints.
//!
//! - GET /api/v1/sectors/tree
//! - GET /api/v1/divisions/tree
//! - GET /api/v1/hips/tree - HIP types, their clusters and hazards

use axum::{Extension, Json, Router, extract::State, routing::get};
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::AppError,
    forms::{ResourceDef, resources},
    i18n::Translator,
    middleware::{auth::AuthContext, lang::Lang},
    models::role::Permission,
    state::AppState,
    store,
    tree::{TreeNode, build_tree},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/sectors/tree",
            get(resource_tree).layer(Extension(&resources::SECTORS)),
        )
        .route(
            "/api/v1/divisions/tree",
            get(resource_tree).layer(Extension(&resources::DIVISIONS)),
        )
        .route("/api/v1/hips/tree", get(hip_tree))
}

fn string_key(row: &Value, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Add a `label` key holding the row's name in the request language.
fn with_label(mut row: Value, t: &Translator) -> Value {
    let label = row.get("name").map(|name| t.dbt(name)).unwrap_or_default();
    if let Value::Object(map) = &mut row {
        map.insert("label".to_string(), Value::String(label));
    }
    row
}

/// Nest rows of a self-referencing resource by `parent_id`.
pub fn nest_rows(rows: Vec<Value>, t: &Translator) -> Vec<TreeNode<Value>> {
    let rows = rows.into_iter().map(|row| with_label(row, t)).collect();
    build_tree(
        rows,
        |row| string_key(row, "id").unwrap_or_default(),
        |row| string_key(row, "parent_id"),
    )
}

pub async fn resource_tree(
    State(state): State<AppState>,
    Extension(def): Extension<&'static ResourceDef>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
) -> Result<Json<Vec<TreeNode<Value>>>, AppError> {
    auth.require(Permission::ViewData)?;
    let t = state.translator(&lang.lang, lang.debug);
    let mut conn = state.pool.acquire().await?;
    let rows = store::list_all(&mut conn, def, auth.country_accounts_id).await?;
    Ok(Json(nest_rows(rows, &t)))
}

/// One entry of the HIP hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HipNode {
    /// `type:<id>`, `cluster:<id>` or `hazard:<id>`
    pub key: String,
    pub kind: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub name: String,
    #[serde(skip)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HipRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub code: Option<String>,
    pub name: Value,
}

/// Flatten the three HIP tables into nodes keyed by kind.
pub fn hip_nodes(types: Vec<HipRow>, clusters: Vec<HipRow>, hazards: Vec<HipRow>, t: &Translator) -> Vec<HipNode> {
    let levels = [
        ("type", None, types),
        ("cluster", Some("type"), clusters),
        ("hazard", Some("cluster"), hazards),
    ];
    levels
        .into_iter()
        .flat_map(|(kind, parent_kind, rows)| {
            rows.into_iter().map(move |row| HipNode {
                key: format!("{kind}:{}", row.id),
                kind,
                parent: parent_kind.zip(row.parent_id).map(|(p, id)| format!("{p}:{id}")),
                name: t.dbt(&row.name),
                code: row.code,
                id: row.id,
            })
        })
        .collect()
}

pub async fn hip_tree(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    lang: Lang,
) -> Result<Json<Vec<TreeNode<HipNode>>>, AppError> {
    auth.require(Permission::ViewData)?;
    let t = state.translator(&lang.lang, lang.debug);
    let mut conn = state.pool.acquire().await?;

    let types = sqlx::query_as::<_, HipRow>(
        "SELECT id, NULL::text AS parent_id, NULL::text AS code, name FROM hip_types ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let clusters = sqlx::query_as::<_, HipRow>(
        "SELECT id, type_id AS parent_id, NULL::text AS code, name FROM hip_clusters ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let hazards = sqlx::query_as::<_, HipRow>(
        "SELECT id, cluster_id AS parent_id, code, name FROM hip_hazards ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let nodes = hip_nodes(types, clusters, hazards, &t);
    Ok(Json(build_tree(nodes, |n| n.key.clone(), |n| n.parent.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Translations;
    use serde_json::json;

    fn hip(id: &str, parent: Option<&str>, name: &str) -> HipRow {
        HipRow {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            code: None,
            name: json!({ "en": name }),
        }
    }

    #[test]
    fn hip_levels_nest_by_kind() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        // Same id on two levels must not collide.
        let nodes = hip_nodes(
            vec![hip("1", None, "Meteorological")],
            vec![hip("1", Some("1"), "Convective")],
            vec![hip("MH0001", Some("1"), "Thunderstorm"), hip("X", Some("9"), "Orphan")],
            &t,
        );
        let tree = build_tree(nodes, |n| n.key.clone(), |n| n.parent.clone());

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].item.key, "type:1");
        assert_eq!(tree[0].children[0].item.name, "Convective");
        assert_eq!(tree[0].children[0].children[0].item.key, "hazard:MH0001");
        assert_eq!(tree[1].item.key, "hazard:X");
    }

    #[test]
    fn sector_rows_nest_and_get_labels() {
        let catalog = Translations::new("en");
        let t = catalog.translator("en", false);
        let rows = vec![
            json!({"id": "a", "parent_id": null, "name": {"en": "Agriculture", "es": "Agricultura"}}),
            json!({"id": "b", "parent_id": "a", "name": {"es": "Cultivos"}}),
        ];
        let tree = nest_rows(rows, &t);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].item["label"], "Agriculture");
        assert_eq!(tree[0].children[0].item["label"], "Cultivos");

        let rendered = serde_json::to_value(&tree).unwrap();
        assert_eq!(rendered[0]["children"][0]["id"], "b");
    }
}
