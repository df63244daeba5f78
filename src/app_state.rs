use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::repositories::{
    AttendanceRepository, CertificateRepository, CertificateRequestRepository, EnrollmentRepository,
    ProgramRepository, SessionRepository, TemplateRepository,
};
use crate::services::renderer::{CertificateRenderer, FontLibrary};
use crate::services::CertificateFileService;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub env: &'static Config,
    pub certificates: CertificateRepository,
    pub certificate_requests: CertificateRequestRepository,
    pub templates: TemplateRepository,
    pub enrollments: EnrollmentRepository,
    pub attendances: AttendanceRepository,
    pub sessions: SessionRepository,
    pub programs: ProgramRepository,
    pub certificate_files: CertificateFileService,
}

impl AppState {
    pub fn new(db: PgPool, env: &'static Config, fonts: FontLibrary) -> Self {
        let certificates = CertificateRepository::new(db.clone());
        let templates = TemplateRepository::new(db.clone());
        let certificate_files = CertificateFileService::new(
            Arc::new(certificates.clone()),
            Arc::new(templates.clone()),
            Arc::new(CertificateRenderer::new(fonts)),
            env.app.public_url.clone(),
        );

        Self {
            certificate_requests: CertificateRequestRepository::new(db.clone()),
            enrollments: EnrollmentRepository::new(db.clone()),
            attendances: AttendanceRepository::new(db.clone()),
            sessions: SessionRepository::new(db.clone()),
            programs: ProgramRepository::new(db.clone()),
            certificates,
            templates,
            certificate_files,
            db,
            env,
        }
    }
}
