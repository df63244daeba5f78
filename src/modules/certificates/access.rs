use crate::db::CertificateContext;
use crate::middleware::Actor;

/// The recipient, the session trainer, the program owner and admins may see
/// a certificate and its file.
pub fn can_access_certificate(actor: &Actor, context: &CertificateContext) -> bool {
    let relations = &context.relations;

    actor.is_admin()
        || context.certificate.user_id == actor.user_id
        || actor.is(relations.session.as_ref().and_then(|session| session.trainer_id))
        || actor.is(relations.program.as_ref().and_then(|program| program.created_by))
}

pub fn file_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        _ => "bin",
    }
}

pub fn certificate_filename(certificate_code: &str, mime_type: &str) -> String {
    format!("certificate-{}.{}", certificate_code, file_extension(mime_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Role;
    use crate::services::template_resolver::tests::context;
    use uuid::Uuid;

    fn actor(role: Role) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn recipient_and_admin_can_access() {
        let context = context(Uuid::new_v4(), Uuid::new_v4());
        let owner = Actor {
            user_id: context.certificate.user_id,
            role: Role::Student,
        };
        assert!(can_access_certificate(&owner, &context));
        assert!(can_access_certificate(&actor(Role::Admin), &context));
        assert!(!can_access_certificate(&actor(Role::Student), &context));
    }

    #[test]
    fn session_trainer_and_program_owner_can_access() {
        let mut context = context(Uuid::new_v4(), Uuid::new_v4());
        let trainer = actor(Role::Trainer);
        let owner = actor(Role::Trainer);
        assert!(!can_access_certificate(&trainer, &context));

        context.relations.session.as_mut().unwrap().trainer_id = Some(trainer.user_id);
        context.relations.program.as_mut().unwrap().created_by = Some(owner.user_id);
        assert!(can_access_certificate(&trainer, &context));
        assert!(can_access_certificate(&owner, &context));
    }

    #[test]
    fn filenames_follow_the_mime_type() {
        assert_eq!(certificate_filename("CERT-ABC", "image/png"), "certificate-CERT-ABC.png");
        assert_eq!(certificate_filename("CERT-ABC", "image/jpeg"), "certificate-CERT-ABC.jpg");
        assert_eq!(certificate_filename("CERT-ABC", "application/pdf"), "certificate-CERT-ABC.pdf");
        assert_eq!(certificate_filename("CERT-ABC", "text/plain"), "certificate-CERT-ABC.bin");
    }
}
