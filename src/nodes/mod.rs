//! Built-in node types
//!
//! Business logic stays small here; these nodes exist to exercise the node
//! contract, the guard library, timers and the actuation path.

pub mod basic;
pub mod buffer;
pub mod device;
pub mod script;
pub mod timing;

use crate::node::{Node, NodeCatalog};

/// Constructor for any node type with a `Default` starting state
pub fn build<T: Node + Default + 'static>() -> Box<dyn Node> {
    Box::<T>::default()
}

/// Register every built-in node type
pub fn register_builtin(catalog: &mut NodeCatalog) {
    catalog.register("constant", false, build::<basic::Constant>);
    catalog.register("logic", false, build::<basic::Logic>);
    catalog.register("compare", false, build::<basic::Compare>);
    catalog.register("buffer_get", false, build::<buffer::BufferGet>);
    catalog.register("buffer_set", false, build::<buffer::BufferSet>);
    catalog.register("device_trigger", false, build::<device::DeviceTrigger>);
    catalog.register("extract", false, build::<script::Extract>);
    catalog.register("script", false, build::<script::Script>);
    catalog.register("delay", true, build::<timing::Delay>);
    catalog.register("interval", true, build::<timing::Interval>);
}
