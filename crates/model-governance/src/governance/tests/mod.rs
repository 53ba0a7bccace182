mod apply;
mod common;
