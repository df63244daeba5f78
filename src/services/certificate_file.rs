//! Rendering certificates to files and storing them on the certificate row.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::renderer::{CertificateData, CertificateRenderer, RenderError};
use super::template_resolver::{resolve_template, TemplateStore};
use crate::db::{Certificate, CertificateContext, CertificateRelations, DatabaseError};

#[derive(Debug, Error)]
pub enum CertificateFileError {
    #[error("Certificate not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Certificate rendering failed: {0}")]
    Rendering(#[from] RenderError),
}

/// A freshly rendered file ready to be written.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub template_id: Uuid,
    pub generated_at: OffsetDateTime,
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Loads a certificate including its file bytes.
    async fn find_certificate(&self, certificate_id: Uuid) -> Result<Option<Certificate>, DatabaseError>;

    async fn load_relations(&self, certificate: &Certificate) -> Result<CertificateRelations, DatabaseError>;

    /// Writes the file unless one is already stored. With `overwrite` the
    /// write is unconditional. Returns `None` when another writer got there
    /// first.
    async fn store_file(
        &self,
        certificate_id: Uuid,
        file: &StoredFile,
        overwrite: bool,
    ) -> Result<Option<Certificate>, DatabaseError>;
}

#[derive(Clone)]
pub struct CertificateFileService {
    certificates: Arc<dyn CertificateStore>,
    templates: Arc<dyn TemplateStore>,
    renderer: Arc<CertificateRenderer>,
    public_url: String,
}

impl CertificateFileService {
    pub fn new(
        certificates: Arc<dyn CertificateStore>,
        templates: Arc<dyn TemplateStore>,
        renderer: Arc<CertificateRenderer>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            certificates,
            templates,
            renderer,
            public_url: public_url.into(),
        }
    }

    pub async fn load_context(&self, certificate_id: Uuid) -> Result<CertificateContext, CertificateFileError> {
        let certificate = self
            .certificates
            .find_certificate(certificate_id)
            .await?
            .ok_or(CertificateFileError::NotFound)?;
        let relations = self.certificates.load_relations(&certificate).await?;

        Ok(CertificateContext {
            certificate,
            relations,
        })
    }

    /// Returns the certificate with its file, rendering it only when no file
    /// has been stored yet.
    pub async fn generate_and_store_file(&self, context: CertificateContext) -> Result<Certificate, CertificateFileError> {
        if context.certificate.has_file_data() {
            return Ok(context.certificate);
        }

        self.render_and_store(context, false).await
    }

    /// Renders and overwrites whatever file is stored.
    pub async fn force_generate_and_store_file(
        &self,
        context: CertificateContext,
    ) -> Result<Certificate, CertificateFileError> {
        self.render_and_store(context, true).await
    }

    /// Re-renders the certificate, optionally with another template. The new
    /// pin is written together with the file, so a failed render leaves the
    /// certificate as it was.
    pub async fn regenerate(
        &self,
        certificate_id: Uuid,
        template_id: Option<Uuid>,
    ) -> Result<Certificate, CertificateFileError> {
        if let Some(template_id) = template_id {
            if self.templates.find_template(template_id).await?.is_none() {
                return Err(DatabaseError::InvalidInput(format!("Unknown certificate template {}", template_id)).into());
            }
        }

        let mut context = self.load_context(certificate_id).await?;
        if template_id.is_some() {
            context.certificate.template_id = template_id;
        }
        self.force_generate_and_store_file(context).await
    }

    async fn render_and_store(&self, context: CertificateContext, overwrite: bool) -> Result<Certificate, CertificateFileError> {
        let certificate_id = context.certificate.id;
        let template = resolve_template(self.templates.as_ref(), &context).await?;
        let template_id = template.id;
        let data = CertificateData::from_context(&context, &self.public_url);

        let renderer = Arc::clone(&self.renderer);
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&data, &template))
            .await
            .map_err(|e| RenderError::Interrupted(e.to_string()))?
            .map_err(|e| {
                error!(%certificate_id, %template_id, "Certificate rendering failed: {}", e);
                e
            })?;

        let file = StoredFile {
            bytes: rendered.bytes,
            mime_type: rendered.mime_type.to_string(),
            template_id,
            generated_at: OffsetDateTime::now_utc(),
        };

        match self.certificates.store_file(certificate_id, &file, overwrite).await? {
            Some(stored) => {
                info!(
                    %certificate_id,
                    %template_id,
                    size = file.bytes.len(),
                    "Certificate file stored"
                );
                Ok(stored)
            }
            None => {
                debug!(%certificate_id, "Certificate file already stored by a concurrent request");
                self.certificates
                    .find_certificate(certificate_id)
                    .await?
                    .ok_or(CertificateFileError::NotFound)
            }
        }
    }
}
