//! Namespace, attribute and directive vocabulary shared by the model and
//! the resolution engine.
//!
//! By convention a namespace's main attribute uses the namespace string as
//! its key (the `identity` capability carries an `identity` attribute, a
//! `package` capability a `package` attribute, and so on).

/// Identity namespace: exactly one capability per well-formed resource,
/// naming it and carrying its version.
pub const IDENTITY: &str = "identity";

/// Module-to-module dependency namespace.
pub const MODULE: &str = "module";

/// Exported/imported API package namespace.
pub const PACKAGE: &str = "package";

/// Host attachment namespace for fragment-style resources.
pub const HOST: &str = "host";

/// Contract namespace (named API surfaces decoupled from packages).
pub const CONTRACT: &str = "contract";

/// Content namespace (payload descriptors).
pub const CONTENT: &str = "content";

/// Version attribute carried by most capabilities.
pub const ATTR_VERSION: &str = "version";

/// Identity `type` attribute.
pub const ATTR_TYPE: &str = "type";

/// On `package` capabilities, the exporting module's name.
pub const ATTR_MODULE: &str = "module";

/// On `package` and `module` capabilities, the owning module's version.
pub const ATTR_MODULE_VERSION: &str = "module-version";

pub const DIRECTIVE_FILTER: &str = "filter";
pub const DIRECTIVE_RESOLUTION: &str = "resolution";
pub const DIRECTIVE_EFFECTIVE: &str = "effective";

pub const RESOLUTION_MANDATORY: &str = "mandatory";
pub const RESOLUTION_OPTIONAL: &str = "optional";

/// The default effectiveness scope; requirements in it are always live.
pub const EFFECTIVE_RESOLVE: &str = "resolve";

/// Identity `type` for ordinary deployable modules.
pub const TYPE_MODULE: &str = "module";

/// Identity `type` for execution-environment placeholders.
pub const TYPE_ENVIRONMENT: &str = "environment";

/// Identity of the synthetic resource carrying the caller's root
/// requirements.
pub const IDENTITY_INITIAL: &str = "<<INITIAL>>";

/// Identity of the synthetic system resource.
pub const IDENTITY_SYSTEM: &str = "<<SYSTEM>>";

/// Resources whose identity starts with this prefix are execution
/// environment placeholders and never valid candidates.
pub const ENV_PREFIX: &str = "env.";

/// Resources exporting this package are platform implementations, not
/// deployable modules.
pub const PLATFORM_API_PACKAGE: &str = "platform.api";
