pub mod attendance;
pub mod certificate_requests;
pub mod certificates;
pub mod completion;
pub mod templates;
pub mod verify;
