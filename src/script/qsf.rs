//! The `.qsf` script reader.
//!
//! A script wires a server together: the worlds to create, the project
//! file loaded into each (resolved through the host's [`FileSystem`]), and
//! an `init:` list of actions applied to seed the states. Trailing
//! sections (e.g. a debugger's command list) are outside this reader's
//! scope and left unread.

use crate::errors::QuestError;
use crate::server::QuestServer;

use super::filesystem::FileSystem;
use super::reader::{Case, SourceReader};

const FORMAT_MAJOR: usize = 1;
const FORMAT_MINOR: usize = 0;

/// Parse a `.qsf` script against `server`.
pub fn parse_script(
    server: &mut QuestServer,
    fs: &dyn FileSystem,
    file_name: &str,
    source: &str,
    apply_init_actions: bool,
) -> Result<(), QuestError> {
    let mut r = SourceReader::new(file_name, source);

    r.empty_lines();
    r.space(0)?;
    r.keyword("version")?;
    r.space(1)?;
    let major = r.pos_int()?;
    r.space(1)?;
    let minor = r.pos_int()?;
    if major != FORMAT_MAJOR || minor != FORMAT_MINOR {
        return Err(QuestError::UnsupportedVersion {
            file: r.file().to_string(),
            line: r.line() + 1,
            col: 1,
            major: FORMAT_MAJOR as u32,
            minor: FORMAT_MINOR as u32,
            got_major: major as u32,
            got_minor: minor as u32,
        });
    }
    r.empty_lines();

    r.space(0)?;
    r.keyword("script")?;
    r.space(1)?;
    let _script_name = r.name(Case::Both)?;
    r.empty_lines();

    r.space(0)?;
    r.keyword("worlds")?;
    r.colon_with_spaces()?;
    r.next_line()?;
    let world_line = r.line();
    let worlds = r.name_list(Case::Both);
    for (offset, world) in worlds.iter().enumerate() {
        server.create_world(world).map_err(|e| {
            e.context(format!(
                "{}:{}: cannot create world `{world}`",
                r.file(),
                world_line + offset + 1
            ))
        })?;
    }
    r.empty_lines();

    r.space(0)?;
    r.keyword("projects")?;
    r.colon_with_spaces()?;
    r.next_line()?;
    loop {
        let cp = r.checkpoint();
        r.empty_lines();
        if r.space(1).is_err() {
            r.restore(cp);
            break;
        }
        let line = r.line();
        r.bracket_open()?;
        let world = r.name(Case::Both)?;
        r.bracket_close()?;
        r.space(1)?;
        let path = r.rest_of_line();
        if path.is_empty() {
            return Err(r.error("expecting a project file path"));
        }
        let text = fs.get_text_file(&path)?;
        server.add_project(&world, &path, &text).map_err(|e| {
            e.context(format!(
                "{}:{}: while loading `{path}` into world `{world}`",
                r.file(),
                line + 1
            ))
        })?;
        r.next_line()?;
    }
    r.empty_lines();

    r.space(0)?;
    r.keyword("init")?;
    r.colon_with_spaces()?;
    r.next_line()?;
    loop {
        let cp = r.checkpoint();
        r.empty_lines();
        if r.space(1).is_err() {
            r.restore(cp);
            break;
        }
        let line = r.line();
        r.bracket_open()?;
        let world = r.name(Case::Both)?;
        r.bracket_close()?;
        r.space(1)?;
        let action = r.name(Case::Upper)?;
        r.space(0)?;
        r.par_open()?;
        r.space(0)?;
        let mut arguments: Vec<String> = Vec::new();
        let first = r.checkpoint();
        match r.name(Case::Lower) {
            Ok(name) => {
                arguments.push(name);
                r.space(0)?;
                while r.comma().is_ok() {
                    r.space(0)?;
                    arguments.push(r.name(Case::Lower)?);
                    r.space(0)?;
                }
            }
            Err(_) => r.restore(first), // zero-arity call
        }
        r.par_close()?;
        if apply_init_actions {
            server.apply_action(&world, &action, &arguments).map_err(|e| {
                e.context(format!(
                    "{}:{}: init action `{action}` failed",
                    r.file(),
                    line + 1
                ))
            })?;
        }
        r.space(0)?;
        r.next_line()?;
    }

    // Whatever follows (debug sections and the like) is not ours to read.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::plan::QuestStatus;
    use crate::script::filesystem::StdFileSystem;

    const PROJECT: &str = r#"
version 1 0
project cave

type Item
object torch : Item
rel Has(Item)
rel Free(Item)

action Pick:
    i : Item
    pre Free(i)
    rem Free(i)
    add Has(i)

action Init:
    pre
    rem
    add Free(torch)

main_quest Light:
    preconditions:
    goal:
        Has(torch)
    actions:
        Pick
    objects:
        torch
    subquests:
"#;

    fn script(apply_init: bool) -> QuestServer {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cave.quest"), PROJECT).unwrap();
        let fs = StdFileSystem::new(dir.path());

        let src = "version 1 0\nscript demo\n\nworlds:\n    cave\n\nprojects:\n    [cave] cave.quest\n\ninit:\n    [cave] Init()\n";
        let mut server = QuestServer::new("srv");
        server.load_script(&fs, "demo.qsf", src, apply_init).unwrap();
        server
    }

    #[test]
    fn test_script_loads_and_inits() {
        let mut server = script(true);
        // Init ran: Free(torch) holds, so Pick(torch) is legal.
        server
            .apply_action("cave", "Pick", &["torch".into()])
            .unwrap();
        server.perform_planning().unwrap();
        assert_eq!(server.quest_status("cave", "Light"), QuestStatus::Done);
    }

    #[test]
    fn test_init_can_be_skipped() {
        let mut server = script(false);
        // Init was parsed but not applied: preconditions fail.
        let err = server
            .apply_action("cave", "Pick", &["torch".into()])
            .unwrap_err();
        assert!(matches!(err, QuestError::PreconditionsNotMet(..)));
    }

    #[test]
    fn test_trailing_debug_section_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cave.quest"), PROJECT).unwrap();
        let fs = StdFileSystem::new(dir.path());
        let src = "version 1 0\nscript demo\n\nworlds:\n    cave\n\nprojects:\n    [cave] cave.quest\n\ninit:\n\ndebug:\n    expect UNREACHABLE Light\n";
        let mut server = QuestServer::new("srv");
        server.load_script(&fs, "demo.qsf", src, true).unwrap();
        assert!(server.has_world("cave"));
    }
}
