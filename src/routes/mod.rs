/// Router Module Index
///
/// Routes are grouped by the access level they require. The authentication layer is
/// applied per group in `create_router`; finer checks (ownership, editor membership,
/// the comment edit window) run in the policy layer.

/// Routes open to anonymous visitors.
pub mod public;

/// Routes that require a resolved `AuthUser`.
pub mod authenticated;

/// Routes restricted to the Editors group.
pub mod editor;
