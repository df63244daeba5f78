use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{CertificateTemplate, DatabaseError, NewCertificateTemplate, TemplateScope};
use crate::services::template_resolver::TemplateStore;

const TEMPLATE_COLUMNS: &str = "id, name, scope, program_id, session_id, background_image, background_mime_type, \
     layout_config, font_family, font_size, text_color, is_active, created_at, updated_at";

#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_all(&self) -> Result<Vec<CertificateTemplate>, DatabaseError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM certificate_templates ORDER BY created_at DESC");
        let templates = sqlx::query_as::<_, CertificateTemplate>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(templates)
    }

    /// Templates of programs the trainer owns and of sessions they train.
    pub async fn list_for_trainer(&self, trainer_id: Uuid) -> Result<Vec<CertificateTemplate>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {TEMPLATE_COLUMNS} FROM certificate_templates
            WHERE (scope = 'program' AND program_id IN (SELECT id FROM programs WHERE created_by = $1))
               OR (scope = 'session' AND session_id IN (SELECT id FROM training_sessions WHERE trainer_id = $1))
            ORDER BY created_at DESC
            "#
        );
        let templates = sqlx::query_as::<_, CertificateTemplate>(&sql)
            .bind(trainer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(templates)
    }

    pub async fn update(
        &self,
        template_id: Uuid,
        template: &NewCertificateTemplate,
    ) -> Result<CertificateTemplate, DatabaseError> {
        let sql = format!(
            r#"
            UPDATE certificate_templates
            SET name = $2, scope = $3, program_id = $4, session_id = $5, background_image = $6,
                background_mime_type = $7, layout_config = $8, font_family = $9, font_size = $10,
                text_color = $11, is_active = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING {TEMPLATE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, CertificateTemplate>(&sql)
            .bind(template_id)
            .bind(&template.name)
            .bind(template.scope)
            .bind(template.program_id)
            .bind(template.session_id)
            .bind(&template.background_image)
            .bind(&template.background_mime_type)
            .bind(&template.layout_config)
            .bind(&template.font_family)
            .bind(template.font_size)
            .bind(&template.text_color)
            .bind(template.is_active)
            .fetch_one(&self.pool)
            .await?;

        Ok(updated)
    }

    pub async fn delete(&self, template_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM certificate_templates WHERE id = $1")
            .bind(template_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for TemplateRepository {
    async fn find_template(&self, template_id: Uuid) -> Result<Option<CertificateTemplate>, DatabaseError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM certificate_templates WHERE id = $1");
        let template = sqlx::query_as::<_, CertificateTemplate>(&sql)
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(template)
    }

    async fn latest_active(
        &self,
        scope: TemplateScope,
        target: Option<Uuid>,
    ) -> Result<Option<CertificateTemplate>, DatabaseError> {
        let target_column = match scope {
            TemplateScope::Global => None,
            TemplateScope::Program => Some("program_id"),
            TemplateScope::Session => Some("session_id"),
        };

        let template = match (target_column, target) {
            (None, _) => {
                let sql = format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM certificate_templates \
                     WHERE is_active AND scope = $1 ORDER BY created_at DESC LIMIT 1"
                );
                sqlx::query_as::<_, CertificateTemplate>(&sql)
                    .bind(scope)
                    .fetch_optional(&self.pool)
                    .await?
            }
            (Some(column), Some(target)) => {
                let sql = format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM certificate_templates \
                     WHERE is_active AND scope = $1 AND {column} = $2 ORDER BY created_at DESC LIMIT 1"
                );
                sqlx::query_as::<_, CertificateTemplate>(&sql)
                    .bind(scope)
                    .bind(target)
                    .fetch_optional(&self.pool)
                    .await?
            }
            (Some(_), None) => None,
        };

        Ok(template)
    }

    async fn create_template(&self, template: &NewCertificateTemplate) -> Result<CertificateTemplate, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO certificate_templates
                (name, scope, program_id, session_id, background_image, background_mime_type, layout_config,
                 font_family, font_size, text_color, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, CertificateTemplate>(&sql)
            .bind(&template.name)
            .bind(template.scope)
            .bind(template.program_id)
            .bind(template.session_id)
            .bind(&template.background_image)
            .bind(&template.background_mime_type)
            .bind(&template.layout_config)
            .bind(&template.font_family)
            .bind(template.font_size)
            .bind(&template.text_color)
            .bind(template.is_active)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }
}
