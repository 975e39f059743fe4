//! Widget registry: the single owner of loaded widget descriptors.

mod core;
mod resolver;

pub use core::{WidgetDescriptor, WidgetRegistry};
pub use resolver::{ResolveResult, ResolverMap, ViewHandle, WidgetFactory, WidgetResolver};
