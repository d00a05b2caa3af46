/// Router Module Index
///
/// Routes are split by access level so the authentication layer is applied once,
/// at the module boundary, instead of being remembered handler by handler.

/// Routes accessible to anonymous callers. Read-only; anonymous reads are
/// restricted to published lessons inside the handlers.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware. Every lesson
/// mutation lives here.
pub mod authenticated;
