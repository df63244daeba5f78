mod attendance_repository;
mod certificate_repository;
mod certificate_request_repository;
mod enrollment_repository;
mod program_repository;
mod session_repository;
mod template_repository;

pub use attendance_repository::AttendanceRepository;
pub use certificate_repository::CertificateRepository;
pub use certificate_request_repository::CertificateRequestRepository;
pub use enrollment_repository::EnrollmentRepository;
pub use program_repository::ProgramRepository;
pub use session_repository::SessionRepository;
pub use template_repository::TemplateRepository;
