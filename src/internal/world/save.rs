//! Save-file emission.
//!
//! A save file is an ordinary `.quest` project whose sole action, `Load`,
//! re-establishes the world: its `add` list is the current state and its
//! status hooks restore every quest manager's status, active goal, and
//! parent link. Loading it into a world built from the same definitions
//! reproduces identical status and state.

use std::fmt::Write;

use crate::internal::plan::QuestStatus;

use super::World;

impl World {
    /// Render the current world as a loadable `.quest` project.
    ///
    /// Status hooks are written in reverse definition order: a quest's
    /// `subquests:` list may only reference earlier sub-quests, so walking
    /// backwards guarantees every parent's hook precedes its children's.
    pub fn generate_save_file(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Save file for '{}'", self.server_world_name);
        let _ = writeln!(out, "version 1 0");
        let _ = writeln!(out, "project {}", self.world_name);
        let _ = writeln!(out);
        let _ = writeln!(out, "action Load:");

        for quests in [&self.main_quests, &self.sub_quests] {
            for manager in quests.iter().rev() {
                let name = manager.quest().name();
                let _ = write!(out, "    status {name} ");
                match manager.status() {
                    QuestStatus::Inactive => {
                        let _ = write!(out, "INACTIVE");
                    }
                    QuestStatus::Unreachable => {
                        let _ = write!(out, "UNREACHABLE");
                    }
                    QuestStatus::Done => {
                        let _ = write!(out, "DONE {}", manager.last_active_goal());
                    }
                    // Both live statuses load back as ACTIVE; planning
                    // recomputes reachability from the restored state.
                    QuestStatus::Reachable | QuestStatus::Unknown => {
                        let _ = write!(out, "ACTIVE {}", manager.last_active_goal());
                    }
                }
                if manager.status() != QuestStatus::Inactive {
                    if let Some((parent, parent_goal)) = manager.parent() {
                        let _ = write!(out, " PARENT {} {}", parent.name(), parent_goal);
                    }
                }
                let _ = writeln!(out);
            }
        }

        let _ = writeln!(out, "    pre # none");
        let _ = writeln!(out, "    rem # none");
        let _ = writeln!(out, "    add # Current State:");
        for statement in self.state().statements() {
            let _ = writeln!(out, "        {statement}");
        }
        out
    }
}
