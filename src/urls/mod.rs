//! URL routing: declarative table, compiled patterns and resolution

pub mod conf;
pub mod pattern;
pub mod resolver;
pub mod table;

pub use conf::{Endpoint, Page, PageKind, RestBinding, RestMethods, UrlEntry, UrlTarget, ViewFlag};
pub use pattern::{ParamGuard, UrlPattern};
pub use resolver::{Resolver, ResolverMatch, RouteSummary};
pub use table::UrlConf;
