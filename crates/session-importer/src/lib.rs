//! Session import from browser-harvested material.
//!
//! When the direct password grant is unavailable, a session can be built from
//! a cookie header and/or bearer token obtained elsewhere: pasted by the user,
//! read from a browser's cookie store, or produced by a browser that ran the
//! grant itself. External scripts are reached through the [`Collaborator`]
//! trait so tests can substitute a fake.

mod browser;
mod collaborator;
mod cookies;
mod error;
mod session;

pub use browser::{BrowserAutomation, BrowserLogin, BrowserLoginRequest, CookieExtraction};
pub use collaborator::{
    ensure_npm_project, Collaborator, CollaboratorRequest, NpmProject, ScriptCollaborator,
    CHROME_COOKIES_PACKAGE, DEFAULT_NPM, DEFAULT_PROGRAM, DEFAULT_TIMEOUT, OUTPUT_PATH_ENV,
};
pub use cookies::{normalize_cookie_header, parse_cookie_header, CookieJar};
pub use error::{CollaboratorError, ImportError, ImportResult};
pub use session::{host_from_base_url, ImportedSession, Session, SessionImporter};
