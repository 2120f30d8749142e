//! Integration tests for folder node mutations and sync

mod common;

use std::collections::BTreeMap;

use ::common::collaborators::BroadcastError;
use ::common::crypto::PlainFile;
use ::common::hash::{hash_and_hex, merkle_path};
use ::common::tree::{ChangeRecord, FileEntry, FolderNode, SyncState, TreeError};

fn post_file_addresses(records: &[ChangeRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(ChangeRecord::as_filetree_entry)
        .map(|entry| entry.address())
        .collect()
}

#[test]
fn test_add_child_dirs_collapses_duplicates() {
    let (mut docs, alice, _, _) = common::setup_tree_env();

    let added = docs.add_child_dirs(&["reports", "reports"], &alice).unwrap();
    assert_eq!(docs.dir_children(), ["reports"]);
    assert!(added.existing.is_empty());
    assert_eq!(added.children.len(), 1);

    // the new child's record, then this node's record
    assert_eq!(
        post_file_addresses(&added.staged.records),
        vec![
            merkle_path("/home/alice/docs/reports"),
            merkle_path("/home/alice/docs"),
        ]
    );
    assert_eq!(
        added.staged.records[0]
            .as_filetree_entry()
            .unwrap()
            .address(),
        docs.child_merkle_path("reports")
    );

    let child = &added.children[0];
    assert_eq!(child.who_am_i(), "reports");
    assert_eq!(child.where_am_i(), "/home/alice/docs");
    assert_eq!(child.who_owns_me(), "alice");
    assert_eq!(child.state(), SyncState::Unsaved);
}

#[test]
fn test_add_child_dirs_is_idempotent() {
    let (mut docs, alice, _, _) = common::setup_tree_env();

    docs.add_child_dirs(&["reports"], &alice).unwrap();
    let again = docs.add_child_dirs(&["reports"], &alice).unwrap();

    assert_eq!(again.existing, vec!["reports".to_string()]);
    assert!(again.children.is_empty());
    assert!(again.staged.records.is_empty());
    assert_eq!(docs.dir_children(), ["reports"]);
}

#[test]
fn test_add_child_dirs_mixed() {
    let (mut docs, alice, _, _) = common::setup_tree_env();
    docs.add_child_dirs(&["a"], &alice).unwrap();

    let added = docs.add_child_dirs(&["a", "b", "c", "b"], &alice).unwrap();
    assert_eq!(added.existing, vec!["a".to_string()]);
    assert_eq!(added.children.len(), 2);
    // b, c, then docs itself
    assert_eq!(added.staged.records.len(), 3);
    assert_eq!(docs.dir_children(), ["a", "b", "c"]);
}

#[test]
fn test_remove_absent_names_is_a_noop() {
    let (mut docs, alice, _, _) = common::setup_tree_env();
    docs.add_child_dirs(&["a", "b"], &alice).unwrap();
    docs.mark_synced();

    let staged = docs
        .remove_child_dir_and_file_references(&["nope"], &["missing.txt"], &alice)
        .unwrap();
    assert_eq!(staged.state, SyncState::Synced);
    assert_eq!(staged.records.len(), 1);
    assert_eq!(docs.dir_children(), ["a", "b"]);

    let staged = docs.remove_child_dir_references(&["a", "zzz"], &alice).unwrap();
    assert_eq!(staged.state, SyncState::Dirty);
    assert_eq!(docs.dir_children(), ["b"]);
}

#[test]
fn test_file_references_last_write_wins() {
    let (mut docs, alice, _, _) = common::setup_tree_env();

    let (_, first) = docs
        .add_file(&PlainFile::new("plan.md", "text/markdown", 1, b"v1".to_vec()), &alice)
        .unwrap();
    let (_, second) = docs
        .add_file(&PlainFile::new("plan.md", "text/markdown", 2, b"v2!".to_vec()), &alice)
        .unwrap();

    assert_eq!(docs.file_children().len(), 1);
    let entry = docs.file("plan.md").unwrap();
    assert_eq!(entry.network_name(), second.name);
    assert_eq!(entry.meta().size, 3);

    // the replaced entry's key no longer opens anything through this node
    assert!(docs.open_file("plan.md", &first.envelope, &alice).is_err());
    let opened = docs.open_file("plan.md", &second.envelope, &alice).unwrap();
    assert_eq!(opened.content, b"v2!");

    let staged = docs
        .remove_child_file_references(&["plan.md"], &alice)
        .unwrap();
    assert_eq!(staged.records.len(), 1);
    assert!(docs.file_children().is_empty());
}

#[test]
fn test_add_file_references_merges() {
    let (mut docs, alice, _, _) = common::setup_tree_env();
    let meta = PlainFile::new("a.txt", "text/plain", 0, Vec::new()).meta;

    let files = BTreeMap::from([
        ("a.txt".to_string(), FileEntry::new(meta.clone(), "x.jkl")),
        ("b.txt".to_string(), FileEntry::new(meta.clone(), "y.jkl")),
    ]);
    docs.add_child_file_references(files, &alice).unwrap();

    let files = BTreeMap::from([("a.txt".to_string(), FileEntry::new(meta, "z.jkl"))]);
    docs.add_child_file_references(files, &alice).unwrap();

    assert_eq!(docs.file_children().len(), 2);
    assert_eq!(docs.file("a.txt").unwrap().network_name(), "z.jkl");
    assert_eq!(docs.file("b.txt").unwrap().network_name(), "y.jkl");
}

#[test]
fn test_open_missing_file() {
    let (docs, alice, _, _) = common::setup_tree_env();
    assert!(matches!(
        docs.open_file("ghost", &[], &alice),
        Err(TreeError::FileNotFound(name)) if name == "ghost"
    ));
}

#[test]
fn test_record_hides_names() {
    let (mut docs, alice, _, _) = common::setup_tree_env();
    docs.add_child_dirs(&["reports"], &alice).unwrap();

    let record = docs.to_record(&alice).unwrap();
    assert_eq!(record.account, hash_and_hex("alice"));
    assert_eq!(record.hash_parent, merkle_path("/home/alice"));
    assert_eq!(record.hash_child, hash_and_hex("docs"));

    let json = String::from_utf8(ChangeRecord::PostFile(record).to_json().unwrap()).unwrap();
    assert!(!json.contains("reports"));
    assert!(!json.contains("alice"));
}

#[test]
fn test_load_roundtrip_after_mutations() {
    let (mut docs, alice, _, _) = common::setup_tree_env();
    docs.add_child_dirs(&["a", "b"], &alice).unwrap();
    let (staged, encoded) = docs
        .add_file(&PlainFile::new("n.txt", "text/plain", 9, b"note".to_vec()), &alice)
        .unwrap();

    let record = staged.records.last().unwrap().as_filetree_entry().unwrap();
    let loaded = FolderNode::load(record, &alice).unwrap();

    assert_eq!(loaded.state(), SyncState::Synced);
    assert_eq!(loaded.my_path(), "/home/alice/docs");
    assert_eq!(loaded.dir_children(), ["a", "b"]);
    assert_eq!(loaded.file("n.txt"), docs.file("n.txt"));

    let opened = loaded.open_file("n.txt", &encoded.envelope, &alice).unwrap();
    assert_eq!(opened.content, b"note");
    assert_eq!(opened.meta.last_modified, 9);
}

#[tokio::test]
async fn test_sync_state_transitions() {
    let (mut docs, alice, _, broadcaster) = common::setup_tree_env();
    assert_eq!(docs.state(), SyncState::Unsaved);

    let added = docs.add_child_dirs(&["a"], &alice).unwrap();
    assert_eq!(added.staged.state, SyncState::Unsaved);

    let receipts = docs.sync(&added.staged.records, &broadcaster).await.unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[1].height, 2);
    assert_eq!(docs.state(), SyncState::Synced);
    assert_eq!(broadcaster.records().unwrap(), added.staged.records);

    let staged = docs.add_child_dirs(&["b"], &alice).unwrap().staged;
    assert_eq!(staged.state, SyncState::Dirty);
    assert_eq!(docs.state(), SyncState::Dirty);

    docs.sync(&staged.records, &broadcaster).await.unwrap();
    assert_eq!(docs.state(), SyncState::Synced);
    assert_eq!(broadcaster.records().unwrap().len(), 4);
}

#[tokio::test]
async fn test_sync_propagates_broadcaster_errors() {
    let (mut docs, alice, _, broadcaster) = common::setup_tree_env();
    let staged = docs.add_child_dirs(&["a"], &alice).unwrap().staged;

    broadcaster.reject_next("out of gas").unwrap();
    let result = docs.sync(&staged.records, &broadcaster).await;

    assert!(matches!(
        result,
        Err(TreeError::Broadcast(BroadcastError::Rejected(reason))) if reason == "out of gas"
    ));
    assert_eq!(docs.state(), SyncState::Unsaved);
    assert!(broadcaster.records().unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_without_own_record_keeps_state() {
    let (mut docs, alice, _, broadcaster) = common::setup_tree_env();
    let added = docs.add_child_dirs(&["a"], &alice).unwrap();
    docs.sync(&added.staged.records, &broadcaster).await.unwrap();

    let staged = docs.add_child_dirs(&["b"], &alice).unwrap().staged;
    assert_eq!(docs.state(), SyncState::Dirty);

    let receipts = docs.sync(&[], &broadcaster).await.unwrap();
    assert!(receipts.is_empty());
    assert_eq!(docs.state(), SyncState::Dirty);

    // the child's record alone does not carry this node's change
    docs.sync(&staged.records[..1], &broadcaster).await.unwrap();
    assert_eq!(docs.state(), SyncState::Dirty);

    // neither does a record from another node with the same path
    let stranger = common::alice_docs().to_record(&alice).unwrap();
    docs.sync(&[ChangeRecord::PostFile(stranger)], &broadcaster).await.unwrap();
    assert_eq!(docs.state(), SyncState::Dirty);

    docs.sync(&staged.records[1..], &broadcaster).await.unwrap();
    assert_eq!(docs.state(), SyncState::Synced);
}
