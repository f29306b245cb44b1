use crate::{error::ApiError, models::User};

/// Authorization Policy
///
/// Pure decision functions, evaluated per request after authentication has
/// resolved the actor. Request-level access (may this actor reach the
/// endpoint) falls out of the router layout: safe read endpoints live in the
/// public router with no extractor, while every mutating handler takes an
/// `AuthUser`, so anonymous mutation is rejected with 401 before any policy
/// runs. The functions here cover the remaining object-level and role checks.

/// Object-level rule for reviews and comments: the author, a moderator, or
/// an admin (role or staff flag) may mutate; everyone else is denied.
pub fn can_modify_content(actor: &User, author_id: i64) -> bool {
    actor.id == author_id || actor.is_moderator() || actor.is_admin()
}

/// Role gate for titles, categories, genres and user management.
pub fn is_admin(actor: &User) -> bool {
    actor.is_admin()
}

/// Maps the admin gate onto the handler error type.
pub fn ensure_admin(actor: &User) -> Result<(), ApiError> {
    if is_admin(actor) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Maps the review/comment ownership rule onto the handler error type.
pub fn ensure_can_modify_content(actor: &User, author_id: i64) -> Result<(), ApiError> {
    if can_modify_content(actor, author_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::roles;

    fn actor(id: i64, role: &str, is_staff: bool) -> User {
        User {
            id,
            username: format!("user{id}"),
            role: role.to_string(),
            is_staff,
            ..User::default()
        }
    }

    #[test]
    fn author_can_modify_own_content() {
        let u = actor(1, roles::USER, false);
        assert!(can_modify_content(&u, 1));
    }

    #[test]
    fn plain_user_cannot_modify_others_content() {
        let u = actor(1, roles::USER, false);
        assert!(!can_modify_content(&u, 2));
    }

    #[test]
    fn moderator_and_admin_override_ownership() {
        let moder = actor(3, roles::MODERATOR, false);
        let admin = actor(4, roles::ADMIN, false);
        let staff = actor(5, roles::USER, true);
        assert!(can_modify_content(&moder, 2));
        assert!(can_modify_content(&admin, 2));
        // Staff flag grants admin capability without the admin role.
        assert!(can_modify_content(&staff, 2));
    }

    #[test]
    fn admin_gate_rejects_user_and_moderator() {
        assert!(ensure_admin(&actor(1, roles::ADMIN, false)).is_ok());
        assert!(ensure_admin(&actor(2, roles::USER, true)).is_ok());
        assert!(ensure_admin(&actor(3, roles::USER, false)).is_err());
        assert!(ensure_admin(&actor(4, roles::MODERATOR, false)).is_err());
    }
}
