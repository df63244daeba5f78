pub mod certificate_file;
pub mod certificate_issuance;
pub mod completion;
pub mod renderer;
pub mod template_resolver;

pub use certificate_file::{CertificateFileError, CertificateFileService, CertificateStore};
pub use completion::{CompletionOutcome, CompletionSummary, EnrollmentStore};
pub use template_resolver::TemplateStore;
