//! The `.quest` project reader.
//!
//! A project is a line-oriented sequence of definitions (`type`,
//! `object`, `rel`, `rlist`, `agroup`, `action`, `quest`/`main_quest`)
//! that drive the world's definition contracts in source order. Save files
//! are ordinary projects whose sole action `Load` carries status hooks and
//! the saved state, so this reader doubles as the load path.

use crate::errors::QuestError;
use crate::internal::plan::{QuestHeuristic, QuestOption, QuestStatus, SearchStrategy};
use crate::internal::world::World;

use super::reader::{Case, SourceReader};

const FORMAT_MAJOR: usize = 1;
const FORMAT_MINOR: usize = 0;

/// Parse `.quest` source into `world`.
///
/// Definitions apply as they parse; an error aborts the rest of the file
/// without rolling back earlier definitions, so callers should discard the
/// world on failure.
pub fn parse_project(world: &mut World, file_name: &str, source: &str) -> Result<(), QuestError> {
    ProjectParser {
        r: SourceReader::new(file_name, source),
        world,
    }
    .parse()
}

struct ProjectParser<'w> {
    r: SourceReader,
    world: &'w mut World,
}

impl ProjectParser<'_> {
    fn parse(mut self) -> Result<(), QuestError> {
        self.r.empty_lines();
        self.version()?;
        self.r.empty_lines();

        self.r.space(0)?;
        self.r.keyword("project")?;
        self.r.space(1)?;
        let _project_name = self.r.name(Case::Both)?;
        self.r.empty_lines();

        while !self.r.at_end() {
            self.r.space(0)?;
            let command = self.r.name(Case::Lower)?;
            self.r.space(0)?;
            match command.as_str() {
                "type" => self.type_definition()?,
                "object" => self.object_definition()?,
                "rel" => self.relation_definition()?,
                "rlist" => self.rlist_definition()?,
                "agroup" => self.agroup_definition()?,
                "action" => self.action_definition()?,
                "quest" => self.quest_definition(false)?,
                "main_quest" => self.quest_definition(true)?,
                other => {
                    return Err(self.r.error(format!("unknown keyword `{other}`")));
                }
            }
            self.r.empty_lines();
        }
        Ok(())
    }

    /// Tag a world error with the position the definition started at.
    fn at_line(&self, line: usize, err: QuestError) -> QuestError {
        err.context(format!(
            "{}:{}: definition rejected by the world",
            self.r.file(),
            line + 1
        ))
    }

    fn version(&mut self) -> Result<(), QuestError> {
        self.r.space(0)?;
        self.r.keyword("version")?;
        self.r.space(1)?;
        let major = self.r.pos_int()?;
        self.r.space(1)?;
        let minor = self.r.pos_int()?;
        if major != FORMAT_MAJOR || minor != FORMAT_MINOR {
            return Err(QuestError::UnsupportedVersion {
                file: self.r.file().to_string(),
                line: self.r.line() + 1,
                col: 1,
                major: FORMAT_MAJOR as u32,
                minor: FORMAT_MINOR as u32,
                got_major: major as u32,
                got_minor: minor as u32,
            });
        }
        Ok(())
    }

    /// Comma-separated uppercase names, e.g. supertype or argument types.
    fn type_list(&mut self, allow_empty: bool) -> Result<Vec<String>, QuestError> {
        let mut out = Vec::new();
        loop {
            self.r.space(0)?;
            let cp = self.r.checkpoint();
            match self.r.name(Case::Upper) {
                Ok(name) => out.push(name),
                Err(err) => {
                    if allow_empty && out.is_empty() {
                        self.r.restore(cp);
                        return Ok(out);
                    }
                    return Err(err);
                }
            }
            self.r.space(0)?;
            if self.r.comma().is_err() {
                break;
            }
        }
        Ok(out)
    }

    /// Comma-separated lowercase names inside parentheses; may be empty.
    fn object_list(&mut self) -> Result<Vec<String>, QuestError> {
        let mut out = Vec::new();
        self.r.space(0)?;
        let cp = self.r.checkpoint();
        match self.r.name(Case::Lower) {
            Ok(name) => out.push(name),
            Err(_) => {
                self.r.restore(cp);
                return Ok(out);
            }
        }
        self.r.space(0)?;
        while self.r.comma().is_ok() {
            self.r.space(0)?;
            out.push(self.r.name(Case::Lower)?);
            self.r.space(0)?;
        }
        Ok(out)
    }

    /// Vertical list of `name : Type, Type` parameter rows.
    fn argument_list(&mut self) -> Result<Vec<Vec<String>>, QuestError> {
        let mut out = Vec::new();
        loop {
            let cp = self.r.checkpoint();
            self.r.empty_lines();
            let header = (|| -> Result<String, QuestError> {
                self.r.space(1)?;
                let name = self.r.name(Case::Lower)?;
                self.r.colon_with_spaces()?;
                Ok(name)
            })();
            let Ok(name) = header else {
                self.r.restore(cp);
                break;
            };
            let mut row = vec![name];
            row.extend(self.type_list(false)?);
            self.r.space(0)?;
            self.r.next_line()?;
            out.push(row);
        }
        Ok(out)
    }

    /// Vertical list of `Name(obj, obj)` statement rows. Rows may start on
    /// the current line or on following (indented) lines.
    fn change_list(&mut self) -> Result<Vec<Vec<String>>, QuestError> {
        let mut out = Vec::new();
        loop {
            let cp = self.r.checkpoint();
            self.r.empty_lines();
            let name = (|| -> Result<String, QuestError> {
                self.r.space(1)?;
                self.r.name(Case::Upper)
            })();
            let Ok(name) = name else {
                self.r.restore(cp);
                break;
            };
            // Past the name, malformed rows are hard errors.
            let mut row = vec![name];
            self.r.space(0)?;
            self.r.par_open()?;
            row.extend(self.object_list()?);
            self.r.space(0)?;
            self.r.par_close()?;
            self.r.space(0)?;
            self.r.next_line()?;
            out.push(row);
        }
        Ok(out)
    }

    fn type_definition(&mut self) -> Result<(), QuestError> {
        let line = self.r.line();
        let name = self.r.name(Case::Upper)?;
        let mut supertypes = Vec::new();
        let cp = self.r.checkpoint();
        if self.r.colon_with_spaces().is_ok() {
            supertypes = self.type_list(false)?;
        } else {
            self.r.restore(cp);
        }
        self.r.space(0)?;
        self.r.next_line()?;
        self.world
            .add_type(&name, &supertypes)
            .map_err(|e| self.at_line(line, e))
    }

    fn object_definition(&mut self) -> Result<(), QuestError> {
        let line = self.r.line();
        let name = self.r.name(Case::Lower)?;
        self.r.colon_with_spaces()?;
        let types = self.type_list(false)?;
        self.r.space(0)?;
        self.r.next_line()?;
        self.world
            .add_object(&name, &types)
            .map_err(|e| self.at_line(line, e))
    }

    fn relation_definition(&mut self) -> Result<(), QuestError> {
        let line = self.r.line();
        let name = self.r.name(Case::Upper)?;
        self.r.space(0)?;
        self.r.par_open()?;
        let arg_types = self.type_list(true)?;
        self.r.space(0)?;
        self.r.par_close()?;
        self.r.space(0)?;
        self.r.next_line()?;
        self.world
            .add_relation(&name, &arg_types)
            .map_err(|e| self.at_line(line, e))
    }

    fn rlist_definition(&mut self) -> Result<(), QuestError> {
        let line = self.r.line();
        let name = self.r.name(Case::Upper)?;
        self.r.colon_with_spaces()?;
        self.r.next_line()?;
        let parameters = self.argument_list()?;
        let statements = self.change_list()?;
        self.world
            .add_relation_list(&name, &parameters, &statements)
            .map_err(|e| self.at_line(line, e))
    }

    fn agroup_definition(&mut self) -> Result<(), QuestError> {
        let line = self.r.line();
        let name = self.r.name(Case::Lower)?;
        self.r.space(0)?;
        self.r.next_line()?;
        self.world
            .add_action_group(&name)
            .map_err(|e| self.at_line(line, e))
    }

    /// One parsed `status` hook line of an action definition.
    fn status_hook_line(
        &mut self,
    ) -> Result<(String, QuestStatus, usize, Option<(String, usize)>), QuestError> {
        self.r.space(1)?;
        let quest = self.r.name(Case::Upper)?;
        self.r.space(1)?;
        let word = self.r.name(Case::Upper)?;
        let (status, takes_goal) = match word.as_str() {
            "INACTIVE" => (QuestStatus::Inactive, false),
            // Reachability is recomputed by planning; ACTIVE loads as
            // UNKNOWN.
            "ACTIVE" => (QuestStatus::Unknown, true),
            "DONE" => (QuestStatus::Done, true),
            "UNREACHABLE" => (QuestStatus::Unreachable, false),
            other => {
                return Err(self.r.error(format!("unknown quest status `{other}`")));
            }
        };
        let goal = if takes_goal {
            self.r.space(1)?;
            self.r.pos_int()?
        } else {
            0
        };
        self.r.space(0)?;
        let cp = self.r.checkpoint();
        let parent = if self.r.keyword("PARENT").is_ok() {
            self.r.space(1)?;
            let parent_name = self.r.name(Case::Upper)?;
            self.r.space(1)?;
            let parent_goal = self.r.pos_int()?;
            Some((parent_name, parent_goal))
        } else {
            self.r.restore(cp);
            None
        };
        self.r.space(0)?;
        self.r.next_line()?;
        Ok((quest, status, goal, parent))
    }

    /// A `pre`/`rem`/`add` block: the keyword, then its statement rows.
    fn effect_block(&mut self, word: &str) -> Result<Vec<Vec<String>>, QuestError> {
        self.r.empty_lines();
        self.r.space(0)?;
        self.r.keyword(word)?;
        self.change_list()
    }

    fn action_definition(&mut self) -> Result<(), QuestError> {
        let line = self.r.line();

        let cp = self.r.checkpoint();
        let not_applicable = if self.r.keyword("N/A").is_ok() {
            self.r.space(0)?;
            true
        } else {
            self.r.restore(cp);
            false
        };

        let name = self.r.name(Case::Upper)?;
        self.r.space(0)?;

        let mut groups = Vec::new();
        let cp = self.r.checkpoint();
        if self.r.curly_open().is_ok() {
            loop {
                self.r.space(0)?;
                groups.push(self.r.name(Case::Lower)?);
                self.r.space(0)?;
                if self.r.comma().is_err() {
                    break;
                }
            }
            self.r.space(0)?;
            self.r.curly_close()?;
        } else {
            self.r.restore(cp);
        }

        self.r.colon_with_spaces()?;
        self.r.next_line()?;

        let parameters = self.argument_list()?;

        let mut hooks = Vec::new();
        loop {
            let cp = self.r.checkpoint();
            self.r.empty_lines();
            let found = self.r.space(0).is_ok() && self.r.keyword("status").is_ok();
            if !found {
                self.r.restore(cp);
                break;
            }
            hooks.push(self.status_hook_line()?);
        }

        let pre = self.effect_block("pre")?;
        let rem = self.effect_block("rem")?;
        let add = self.effect_block("add")?;

        self.world
            .add_action(&name, &groups, not_applicable, &parameters, &pre, &rem, &add)
            .map_err(|e| self.at_line(line, e))?;
        for (quest, status, goal, parent) in hooks {
            self.world
                .add_status_hook(
                    &name,
                    &quest,
                    status,
                    goal,
                    parent.as_ref().map(|(p, g)| (p.as_str(), *g)),
                )
                .map_err(|e| self.at_line(line, e))?;
        }
        Ok(())
    }

    fn quest_definition(&mut self, is_main: bool) -> Result<(), QuestError> {
        let line = self.r.line();
        let name = self.r.name(Case::Upper)?;
        self.r.colon_with_spaces()?;
        self.r.next_line()?;

        // Optional options block.
        let mut options: Vec<QuestOption> = Vec::new();
        let mut use_action_tree = false;
        let cp = self.r.checkpoint();
        self.r.empty_lines();
        let has_options = self.r.space(1).is_ok() && self.r.keyword("options").is_ok();
        if has_options {
            self.r.colon_with_spaces()?;
            self.r.next_line()?;
            loop {
                let cp = self.r.checkpoint();
                self.r.empty_lines();
                let opt = (|| -> Result<String, QuestError> {
                    self.r.space(1)?;
                    self.r.name(Case::Lower)
                })();
                let Ok(opt) = opt else {
                    self.r.restore(cp);
                    break;
                };
                match opt.as_str() {
                    "searchLimit" => {
                        self.r.space(1)?;
                        options.push(QuestOption::SearchLimit(self.r.pos_int()?));
                    }
                    "spaceLimit" => {
                        self.r.space(1)?;
                        options.push(QuestOption::SpaceLimit(self.r.pos_int()?));
                    }
                    "omega" => {
                        self.r.space(1)?;
                        options.push(QuestOption::Omega(self.r.pos_int()?));
                    }
                    "heuristic" => {
                        self.r.space(1)?;
                        let which = self.r.name(Case::Upper)?;
                        options.push(QuestOption::Heuristic(match which.as_str() {
                            "SIMPLE" => QuestHeuristic::Simple,
                            "HSP" => QuestHeuristic::Hsp,
                            other => {
                                return Err(self
                                    .r
                                    .error(format!("unknown heuristic `{other}`")));
                            }
                        }));
                    }
                    "strategy" => {
                        self.r.space(1)?;
                        let which = self.r.name(Case::Upper)?;
                        options.push(QuestOption::Strategy(match which.as_str() {
                            "ASTAR" => SearchStrategy::AStar,
                            "DFS" => SearchStrategy::Dfs,
                            other => {
                                return Err(self
                                    .r
                                    .error(format!("unknown strategy `{other}`")));
                            }
                        }));
                    }
                    "use_atree" => use_action_tree = true,
                    "preconditions" => {
                        self.r.restore(cp);
                        break;
                    }
                    other => {
                        return Err(self.r.error(format!("unknown option `{other}`")));
                    }
                }
                self.r.space(0)?;
                self.r.next_line()?;
            }
        } else {
            self.r.restore(cp);
        }

        self.r.empty_lines();
        self.r.space(1)?;
        self.r.keyword("preconditions")?;
        self.r.colon_with_spaces()?;
        self.r.next_line()?;
        let preconditions = self.change_list()?;

        self.r.empty_lines();
        self.r.space(1)?;
        self.r.keyword("goal")?;
        let mut goals = Vec::new();
        loop {
            self.r.colon_with_spaces()?;
            self.r.next_line()?;
            goals.push(self.change_list()?);
            let cp = self.r.checkpoint();
            self.r.empty_lines();
            let more = self.r.space(1).is_ok() && self.r.keyword("goal").is_ok();
            if !more {
                self.r.restore(cp);
                break;
            }
        }

        self.r.empty_lines();
        self.r.space(1)?;
        self.r.keyword("actions")?;
        self.r.colon_with_spaces()?;
        self.r.next_line()?;
        let actions = self.r.name_list(Case::Both);

        self.r.empty_lines();
        self.r.space(1)?;
        self.r.keyword("objects")?;
        self.r.colon_with_spaces()?;
        self.r.next_line()?;
        let objects = self.r.name_list(Case::Both);

        self.r.empty_lines();
        self.r.space(1)?;
        self.r.keyword("subquests")?;
        self.r.colon_with_spaces()?;
        self.r.next_line()?;
        let subquests = self.r.name_list(Case::Upper);

        self.world
            .add_quest(
                &name,
                is_main,
                &preconditions,
                &goals,
                &actions,
                &objects,
                &subquests,
                use_action_tree,
            )
            .map_err(|e| self.at_line(line, e))?;
        for option in options {
            self.world
                .set_quest_option(&name, option)
                .map_err(|e| self.at_line(line, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::plan::QuestStatus;

    const SAMPLE: &str = r#"
# A small island world.
version 1 0
project island

type Entity
type Item : Entity
type Key : Item

object key : Key
object coin : Item

rel Has(Item)
rel Free(Item)
rel Sunrise()

rlist Carrying:
    i : Item
    Has(i)

agroup core

action Pick {core}:
    i : Item
    pre Free(i)
    rem Free(i)
    add Carrying(i)

action Init:
    pre
    rem
    add
        Free(key)
        Free(coin)

main_quest Collect:
    options:
        searchLimit 500
        heuristic HSP
    preconditions:
    goal:
        Has(key)
    actions:
        core
    objects:
        Item
    subquests:
"#;

    #[test]
    fn test_parses_sample_project() {
        let mut world = World::new("srv", "island");
        parse_project(&mut world, "island.quest", SAMPLE).unwrap();
        assert!(world.has_type("Key"));
        assert!(world.has_object("coin"));
        assert!(world.has_relation("Sunrise"));
        assert!(world.has_relation_list("Carrying"));
        assert!(world.has_action_group("core"));
        assert!(world.has_action("Pick"));
        assert!(world.has_main_quest("Collect"));
    }

    #[test]
    fn test_world_errors_carry_position() {
        let mut world = World::new("srv", "w");
        let src = "version 1 0\nproject w\n\nobject ghost : Nowhere\n";
        let err = parse_project(&mut world, "w.quest", src).unwrap_err();
        let desc = err.describe();
        assert!(desc.contains("w.quest:4"), "got: {desc}");
        assert!(desc.contains("undefined type `Nowhere`"), "got: {desc}");
    }

    #[test]
    fn test_rejects_wrong_version() {
        let mut world = World::new("srv", "w");
        let err = parse_project(&mut world, "w.quest", "version 2 0\nproject w\n").unwrap_err();
        assert!(matches!(err, QuestError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_status_hooks_parse() {
        let mut world = World::new("srv", "w");
        let src = r#"
version 1 0
project w

rel Ready()

quest Side:
    preconditions:
    goal:
        Ready()
    actions:
    objects:
    subquests:

main_quest Main:
    preconditions:
    goal:
        Ready()
    actions:
    objects:
    subquests:
        Side

action Load:
    status Main ACTIVE 0
    status Side DONE 0 PARENT Main 0
    pre
    rem
    add
        Ready()
"#;
        parse_project(&mut world, "w.quest", src).unwrap();
        let queue = crate::server::message::MessageQueue::new();
        world.apply_action("Load", &[], &queue).unwrap();
        assert_eq!(world.quest_status("Main"), QuestStatus::Unknown);
        assert_eq!(world.quest_status("Side"), QuestStatus::Done);
    }
}
