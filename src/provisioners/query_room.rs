//! Natural-language query rooms
//!
//! A room is created in the bundle folder, then populated with curated
//! questions and instructions. Population failures only warn: the room is
//! usable without them.

use provision::{ProvisionError, Provisioned, Provisioner, ResourceKind};
use serde_json::{Value, json};
use std::collections::BTreeSet;

use super::{id_of, rejected};
use crate::context::InstallContext;
use crate::descriptor::QueryRoomSpec;
use crate::template::SchemaRewrite;

#[derive(Debug)]
pub struct QueryRoomProvisioner {
    spec: QueryRoomSpec,
    warehouse_id: Option<String>,
    schema: SchemaRewrite,
}

impl QueryRoomProvisioner {
    pub fn new(spec: QueryRoomSpec, warehouse_id: Option<String>, schema: SchemaRewrite) -> Self {
        Self {
            spec,
            warehouse_id,
            schema,
        }
    }

    /// Table identifiers moved to the installed catalog and schema, unquoted
    pub fn tables(&self) -> Vec<String> {
        self.spec
            .table_identifiers
            .iter()
            .map(|table| self.schema.apply(table).replace('`', ""))
            .collect()
    }

    /// Room with this display name inside the bundle folder. Rooms with the
    /// same name elsewhere belong to other installations.
    fn find(&self, ctx: &InstallContext, parent: &str) -> Result<Option<String>, ProvisionError> {
        let name = self.spec.display_name.as_str();
        let found = ctx
            .client
            .pages("2.0/data-rooms", &[], "data_rooms")
            .find_item(|room| {
                room.get("display_name").and_then(Value::as_str) == Some(name)
                    && room.get("parent_folder").and_then(Value::as_str) == Some(parent)
            })?;
        Ok(found.and_then(|room| id_of(&room, "id")))
    }

    /// `folders/<object id>` of the bundle folder, which parents the room.
    /// Without `create` a missing folder gives `None`.
    fn parent_folder(&self, ctx: &InstallContext, create: bool) -> Result<Option<String>, ProvisionError> {
        let folder = &ctx.settings.bundle_folder;
        if create {
            ctx.ensure_folder(folder)?;
        }
        let status = ctx
            .client
            .get("2.0/workspace/get-status", &[("path", folder.as_str())])?;
        if !create && status.is_not_found() {
            return Ok(None);
        }
        status
            .id_field("object_id")
            .filter(|_| !status.is_error())
            .map(|id| Some(format!("folders/{id}")))
            .ok_or_else(|| {
                ProvisionError::new(format!("could not resolve folder {folder}: {}", status.message()))
                    .with_response(status.body.clone())
            })
    }

    fn update(&self, ctx: &InstallContext, id: &str, body: &Value) -> Result<Provisioned, ProvisionError> {
        let response = ctx.client.patch(&format!("2.0/data-rooms/{id}"), body)?;
        if response.is_error() {
            return Err(rejected("could not update query room", body, response));
        }
        let warnings = self.populate(ctx, id, true);
        Ok(warnings
            .into_iter()
            .fold(Provisioned::updated(id), Provisioned::warn))
    }

    /// Add the curated questions and instructions. When `reconcile` is set
    /// the room already exists and only what it lacks is added.
    fn populate(&self, ctx: &InstallContext, room_id: &str, reconcile: bool) -> Vec<String> {
        let mut warnings = Vec::new();
        let questions_path = format!("2.0/data-rooms/{room_id}/curated-questions");
        let instructions_path = format!("2.0/data-rooms/{room_id}/instructions");

        let mut existing = |what: &str, path: &str, key: &str, field: &str| {
            if !reconcile {
                return Some(BTreeSet::new());
            }
            match listed(ctx, path, key, field) {
                Ok(items) => Some(items),
                Err(message) => {
                    warnings.push(format!("could not list {what}: {message}"));
                    None
                }
            }
        };
        let known_questions = existing("curated questions", &questions_path, "curated_questions", "question_text");
        let known_instructions = existing("instructions", &instructions_path, "instructions", "content");

        let mut post = |what: &str, path: String, body: Value| match ctx.client.post(&path, &body) {
            Ok(response) if !response.is_error() => {}
            Ok(response) => warnings.push(format!("could not add {what}: {}", response.message())),
            Err(err) => warnings.push(format!("could not add {what}: {err}")),
        };

        if let Some(known) = known_questions {
            let actions: Vec<Value> = self
                .spec
                .curated_questions
                .iter()
                .filter(|question| !known.contains(question.as_str()))
                .map(|question| {
                    json!({
                        "action_type": "CREATE",
                        "curated_question": {
                            "data_space_id": room_id,
                            "question_text": question,
                            "question_type": "SAMPLE_QUESTION",
                        }
                    })
                })
                .collect();
            if !actions.is_empty() {
                post(
                    "curated questions",
                    format!("{questions_path}/batch-actions"),
                    json!({ "actions": actions }),
                );
            }
        }

        if let Some(known) = known_instructions {
            let text = self.spec.instructions.as_ref().map(|text| {
                ("instructions", "Notes".to_string(), self.schema.apply(text), "TEXT_INSTRUCTION")
            });
            let sql = self.spec.sql_instructions.iter().map(|sql| {
                ("SQL instruction", sql.title.clone(), self.schema.apply(&sql.content), "SQL_INSTRUCTION")
            });
            for (what, title, content, kind) in text.into_iter().chain(sql) {
                if known.contains(&content) {
                    continue;
                }
                post(
                    what,
                    instructions_path.clone(),
                    json!({ "title": title, "content": content, "instruction_type": kind }),
                );
            }
        }
        warnings
    }
}

/// Values of `field` across the items a room lists under `key`
fn listed(ctx: &InstallContext, path: &str, key: &str, field: &str) -> Result<BTreeSet<String>, String> {
    let response = ctx.client.get(path, &[]).map_err(|e| e.to_string())?;
    if response.is_error() {
        return Err(response.message());
    }
    Ok(response
        .body
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get(field).and_then(Value::as_str).map(str::to_string))
        .collect())
}

impl Provisioner<InstallContext> for QueryRoomProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::QueryRoom
    }

    fn logical_id(&self) -> String {
        self.spec.id.clone()
    }

    fn description(&self) -> String {
        format!("Query room {}", self.spec.display_name)
    }

    fn provision(&self, ctx: &InstallContext) -> Result<Provisioned, ProvisionError> {
        let Some(warehouse_id) = &self.warehouse_id else {
            return Err(ProvisionError::new("no SQL warehouse available for the query room"));
        };
        let mut body = json!({
            "display_name": self.spec.display_name,
            "description": self.spec.description,
            "warehouse_id": warehouse_id,
            "table_identifiers": self.tables(),
            "run_as_type": "VIEWER",
        });

        let Some(parent) = self.parent_folder(ctx, true)? else {
            return Err(ProvisionError::new("bundle folder is missing"));
        };
        let provisioned = match self.find(ctx, &parent)? {
            Some(id) => self.update(ctx, &id, &body)?,
            None => {
                body["parent_folder"] = json!(parent);
                let response = ctx.client.post("2.0/data-rooms", &body)?;
                if response.is_conflict() {
                    // Created by a concurrent installation: reconcile it once
                    let Some(id) = self.find(ctx, &parent)? else {
                        return Err(rejected("could not create query room", &body, response));
                    };
                    self.update(ctx, &id, &body)?
                } else {
                    let Some(id) = response.id_field("id").filter(|_| !response.is_error()) else {
                        return Err(rejected("could not create query room", &body, response));
                    };
                    let warnings = self.populate(ctx, &id, false);
                    warnings
                        .into_iter()
                        .fold(Provisioned::created(id), Provisioned::warn)
                }
            }
        };
        Ok(provisioned.named(self.spec.display_name.clone()))
    }

    fn lookup(&self, ctx: &InstallContext) -> Result<Option<String>, ProvisionError> {
        match self.parent_folder(ctx, false)? {
            Some(parent) => self.find(ctx, &parent),
            None => Ok(None),
        }
    }
}
