//! Input data model for the shimwright binding generator.
//!
//! A schema front end produces an ordered list of [`FileDescriptor`]s. Every
//! file, message, field, enum and enum value may carry a rule block describing
//! how it maps onto the native API (aliases, pointer depth, array semantics,
//! callback signatures). Rules arrive either already typed or as a raw payload
//! that [`FileDescriptor::normalize_rules`] decodes.
//!
//! ```
//! use shimwright_schema::*;
//!
//! let mut file = FileDescriptor {
//!     name: "point.shim".to_owned(),
//!     package: "geo".to_owned(),
//!     messages: vec![MessageDescriptor {
//!         name: "Point".to_owned(),
//!         rule: Some(RuleSource::Dynamic(br#"{"alias":"point_t"}"#.to_vec())),
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! file.normalize_rules().unwrap();
//! let rule = file.messages[0].rule.as_ref().unwrap().typed().unwrap();
//! assert_eq!(rule.alias, "point_t");
//! ```

pub mod descriptor;
pub mod plugin;
pub mod rule;

pub use descriptor::*;
pub use plugin::*;
pub use rule::*;

/// Name of the schema file that describes the rule vocabulary itself.
pub const BOOTSTRAP_FILE: &str = "shimwright/rules.shim";
