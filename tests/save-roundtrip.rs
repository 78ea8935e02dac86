//! Save files round-trip through the project reader.
//!
//! A save is a `.quest` project whose `Load` action restores quest
//! statuses (via status hooks) and the world state (via its `add` list).
//! Loading a save into a world built from the same definitions, then
//! saving again, must reproduce the same file up to line order of the
//! state block.

use std::collections::BTreeSet;

use questline::{MessageProcessor, QuestServer, QuestStatus};

struct Sink;
impl MessageProcessor for Sink {}

const PROJECT: &str = r#"
version 1 0
project vault

type Item
object key : Item
object coin : Item

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
    add
        Free(key)
        Free(coin)

main_quest Collect:
    preconditions:
    goal:
        Has(key)
    actions:
        Pick
    objects:
        key
    subquests:
"#;

fn drained(server: &mut QuestServer) {
    let mut sink = Sink;
    while server.process_next_message(&mut sink) {}
}

fn line_set(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Play the world to completion, save, load into a fresh world, save
/// again: both saves contain exactly the same lines.
#[test]
fn save_round_trip() {
    let mut server = QuestServer::new("s");
    server.create_world("vault").unwrap();
    server.add_project("vault", "vault.quest", PROJECT).unwrap();
    server.apply_action("vault", "Init", &[]).unwrap();
    server.perform_planning().unwrap();
    server.apply_action("vault", "Pick", &["key".into()]).unwrap();
    server.perform_planning().unwrap();
    drained(&mut server);
    assert_eq!(server.quest_status("vault", "Collect"), QuestStatus::Done);

    let first = server.generate_save_file("vault").unwrap();

    let mut restored = QuestServer::new("s");
    restored.create_world("vault").unwrap();
    restored
        .add_project("vault", "vault.quest", PROJECT)
        .unwrap();
    restored.add_project("vault", "save.quest", &first).unwrap();
    restored.apply_action("vault", "Load", &[]).unwrap();
    restored.perform_planning().unwrap();
    drained(&mut restored);

    assert_eq!(restored.quest_status("vault", "Collect"), QuestStatus::Done);
    let second = restored.generate_save_file("vault").unwrap();

    assert_eq!(line_set(&first), line_set(&second));
}

/// A mid-run save restores a live quest as ACTIVE and planning recomputes
/// reachability from the restored state.
#[test]
fn save_restores_live_quests() {
    let mut server = QuestServer::new("s");
    server.create_world("vault").unwrap();
    server.add_project("vault", "vault.quest", PROJECT).unwrap();
    server.apply_action("vault", "Init", &[]).unwrap();
    server.perform_planning().unwrap();
    drained(&mut server);
    assert_eq!(
        server.quest_status("vault", "Collect"),
        QuestStatus::Reachable
    );

    let save = server.generate_save_file("vault").unwrap();
    assert!(save.contains("status Collect ACTIVE 0"));
    assert!(save.contains("Free(key)"));

    let mut restored = QuestServer::new("s");
    restored.create_world("vault").unwrap();
    restored
        .add_project("vault", "vault.quest", PROJECT)
        .unwrap();
    restored.add_project("vault", "save.quest", &save).unwrap();
    restored.apply_action("vault", "Load", &[]).unwrap();
    restored.perform_planning().unwrap();
    drained(&mut restored);
    assert_eq!(
        restored.quest_status("vault", "Collect"),
        QuestStatus::Reachable
    );
}

/// Saving is refused while messages are pending: the save would describe
/// state the host has not seen yet.
#[test]
fn save_requires_drained_messages() {
    let mut server = QuestServer::new("s");
    server.create_world("vault").unwrap();
    server.add_project("vault", "vault.quest", PROJECT).unwrap();
    server.apply_action("vault", "Init", &[]).unwrap();
    assert!(server.generate_save_file("vault").is_err());
    drained(&mut server);
    assert!(server.generate_save_file("vault").is_ok());
}
