/// Router Module Index
///
/// Organizes the application's routing logic into access-segregated modules.
/// Segregation here is documentation and layout, not enforcement: the actual
/// checks live in the `AuthUser` extractor and the `policy` module, so an
/// endpoint filed in the wrong module still refuses the wrong caller.
///
/// The three modules map directly to the defined access roles.

/// Routes accessible to all users, anonymous included: the registration and
/// token endpoints plus every read-only listing and detail view.
pub mod public;

/// Routes requiring a validated identity: content creation and mutation,
/// and the self-service profile.
pub mod authenticated;

/// Routes restricted to admins: user management and catalog writes.
pub mod admin;
