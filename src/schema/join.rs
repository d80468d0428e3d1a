use serde::Serialize;
use serde_json::{Map, Value};

use crate::registry::CollectionDescriptor;
use crate::types::RecordId;

/// Resolve one `join` field against its foreign collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lookup {
    /// Key on the local record holding the foreign id
    pub local_field: String,
    /// Foreign collection searched by id
    pub from: String,
    /// Foreign key shown in place of the id
    pub display_key: String,
    /// Key the foreign record is attached under
    pub as_field: String,
}

impl Lookup {
    /// The id this lookup should resolve, if the local value is a well-formed one
    pub fn local_id(&self, record: &Map<String, Value>) -> Option<RecordId> {
        record.get(&self.local_field)?.as_str().and_then(RecordId::parse)
    }
}

/// Read-time augmentation derived from a collection's join fields.
/// Missing foreign records leave `as_field` absent; they never fail the read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinPipeline {
    lookups: Vec<Lookup>,
}

impl JoinPipeline {
    pub fn for_collection(collection: &CollectionDescriptor) -> Self {
        let lookups = collection
            .join_fields()
            .filter_map(|field| {
                let target = field.kind.foreign_ref()?;
                Some(Lookup {
                    local_field: field.key.clone(),
                    from: target.collection.clone(),
                    display_key: target.display_key.clone(),
                    as_field: field.details_key(),
                })
            })
            .collect();
        Self { lookups }
    }

    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }

    /// Lookup resolving the join field `key`
    pub fn lookup(&self, key: &str) -> Option<&Lookup> {
        self.lookups.iter().find(|l| l.local_field == key)
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Plan for the list read
    pub fn list(&self) -> ReadPlan<'_> {
        ReadPlan { id: None, pipeline: self }
    }

    /// Plan for a single read: id filter first, then the lookups
    pub fn single(&self, id: RecordId) -> ReadPlan<'_> {
        ReadPlan { id: Some(id), pipeline: self }
    }
}

/// What a store executes for a read
#[derive(Debug, Clone, Copy)]
pub struct ReadPlan<'a> {
    pub id: Option<RecordId>,
    pub pipeline: &'a JoinPipeline,
}

impl ReadPlan<'_> {
    pub fn lookups(&self) -> &[Lookup] {
        self.pipeline.lookups()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FieldDescriptor, FieldKind, ForeignRef};
    use serde_json::json;

    fn join(label: &str, key: &str, collection: &str, display: &str) -> FieldDescriptor {
        FieldDescriptor::new(
            label,
            key,
            FieldKind::Join {
                target: ForeignRef { collection: collection.to_string(), display_key: display.to_string() },
            },
        )
    }

    #[test]
    fn one_lookup_per_join_field() {
        let collection = CollectionDescriptor {
            name: "employees".to_string(),
            fields: vec![
                FieldDescriptor::new("Name", "name", FieldKind::Text),
                join("Department", "department", "departments", "department"),
                join("Manager", "manager", "employees", "name"),
            ],
            search_fields: vec![],
        };

        let pipeline = JoinPipeline::for_collection(&collection);
        assert_eq!(
            pipeline.lookups(),
            &[
                Lookup {
                    local_field: "department".to_string(),
                    from: "departments".to_string(),
                    display_key: "department".to_string(),
                    as_field: "departmentDetails".to_string(),
                },
                Lookup {
                    local_field: "manager".to_string(),
                    from: "employees".to_string(),
                    display_key: "name".to_string(),
                    as_field: "managerDetails".to_string(),
                },
            ]
        );
    }

    #[test]
    fn plain_collection_has_empty_pipeline() {
        let collection = CollectionDescriptor {
            name: "departments".to_string(),
            fields: vec![FieldDescriptor::new("Location", "location", FieldKind::Text)],
            search_fields: vec![],
        };
        let pipeline = JoinPipeline::for_collection(&collection);
        assert!(pipeline.is_empty());
        assert!(pipeline.list().id.is_none());
    }

    #[test]
    fn single_plan_carries_id_filter() {
        let pipeline = JoinPipeline::default();
        let id = RecordId::new();
        assert_eq!(pipeline.single(id).id, Some(id));
    }

    #[test]
    fn local_id_ignores_malformed_values() {
        let lookup = join("Department", "department", "departments", "department");
        let collection = CollectionDescriptor {
            name: "employees".to_string(),
            fields: vec![lookup],
            search_fields: vec![],
        };
        let pipeline = JoinPipeline::for_collection(&collection);
        let lookup = &pipeline.lookups()[0];

        let id = RecordId::new();
        let record = json!({ "department": id.to_string() }).as_object().cloned().unwrap();
        assert_eq!(lookup.local_id(&record), Some(id));

        let record = json!({ "department": "HR" }).as_object().cloned().unwrap();
        assert_eq!(lookup.local_id(&record), None);
    }
}
