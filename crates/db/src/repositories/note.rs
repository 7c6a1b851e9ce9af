//! Note repository.

use std::sync::Arc;

use crate::entities::{Note, note};
use fedigraph_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};

/// Note repository for database operations.
#[derive(Clone)]
pub struct NoteRepository {
    db: Arc<DatabaseConnection>,
}

impl NoteRepository {
    /// Create a new note repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a note by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<note::Model>> {
        Note::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a note by ID, failing if absent.
    pub async fn get_by_id(&self, id: &str) -> AppResult<note::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Note: {id}")))
    }

    /// Create a new note.
    pub async fn create(&self, model: note::ActiveModel) -> AppResult<note::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a note.
    pub async fn update(&self, model: note::ActiveModel) -> AppResult<note::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a note.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Note::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
