//! Lock entity

use locket_common::{Lock, Resource, TypeCode};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "locks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub path: String,
    pub owner: String,
    pub value: String,
    pub r#type: String,
    pub modified_index: i64,
    pub modified_id: String,
    pub ttl: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Placeholder rows carry neither owner nor value and count as free
    pub fn is_vacant(&self) -> bool {
        self.owner.is_empty() && self.value.is_empty()
    }
}

impl From<Model> for Lock {
    fn from(model: Model) -> Self {
        let type_code = TypeCode::from_type_name(&model.r#type);
        Lock {
            resource: Resource {
                key: model.path,
                owner: model.owner,
                value: model.value,
                r#type: model.r#type,
                type_code,
            },
            modified_index: model.modified_index,
            modified_id: model.modified_id,
            ttl_in_seconds: model.ttl,
        }
    }
}
