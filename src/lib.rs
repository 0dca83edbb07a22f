//! # Game Engine JS
//!
//! JavaScript (QuickJS) scripting language for the game engine object model.
//!
//! ## Features
//!
//! - **Value Marshalling**: lossless conversion between engine variants and script values
//! - **Class Registration**: the engine class hierarchy, singletons and built-in value types
//!   exposed to scripts as constructors and prototypes
//! - **Object Binding**: explicit ownership between script wrappers and engine objects
//! - **Script Resources**: compile, reload (optionally keeping state), instantiate
//! - **Tooling**: file loader/saver, hot reload, a cross-thread debugger request queue
//!
//! ## Architecture Design
//!
//! The engine-facing half does not depend on the script engine:
//! - [`variant`]: tagged values
//! - [`host`]: the reflection surface the engine provides ([`host::HostObjectSystem`])
//! - [`registry`]: class bindings built parent-first into an index-addressable table
//! - [`binder`]: ownership bookkeeping for object wrappers
//!
//! The script-facing half is built on `rquickjs`:
//! - [`js`]: marshaller, registrar and object binder for QuickJS
//! - [`script`]: language driver, script resources and instances
//!
//! ### Example
//!
//! ```ignore
//! use game_engine_js::{host::demo_class_db, JsLanguage, LanguageConfig};
//! use std::rc::Rc;
//!
//! let mut language = JsLanguage::new(Rc::new(demo_class_db()), LanguageConfig::default());
//! language.init()?;
//! let script = language.create_script()?;
//! script.set_source("exports = function () { this.speed = 10; }");
//! script.reload(false)?;
//! ```

/// Errors and shared macros
#[macro_use]
pub mod core;
/// Configuration system
pub mod config;
/// Engine values crossing the script boundary
pub mod variant;
/// Engine object system surface consumed by the bindings
pub mod host;
/// Class binding registry
pub mod registry;
/// Ownership bookkeeping for object wrappers
pub mod binder;
/// QuickJS backend
pub mod js;
/// Script language, resources and instances
pub mod script;

pub use crate::config::{LanguageConfig, LoggingConfig};
pub use crate::core::error::{
    BindingError, CallError, CallResult, RegistryResult, ScriptError, ScriptResult,
};
pub use crate::script::{JsLanguage, ScriptInstance, ScriptResource, ScriptStatus};
pub use crate::variant::{Composite, ObjectId, Variant, VariantType};
