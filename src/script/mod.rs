//! Readers for the engine's textual formats.
//!
//! `.quest` project sources define a world (types, objects, relations,
//! relation lists, action groups, actions, quests); `.qsf` scripts wire
//! worlds, project files, and initial actions together. Both are
//! line-oriented with `#` comments and parsed by recursive descent over
//! the primitives in [`reader`]. File access goes through the
//! [`filesystem::FileSystem`] indirection so hosts control all I/O.

pub mod filesystem;
pub mod project;
pub mod qsf;
pub mod reader;
