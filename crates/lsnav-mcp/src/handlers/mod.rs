mod introspection;
mod navigation;
