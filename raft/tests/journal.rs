use quorum_core::{ManualClock, MemoryNetwork};
use quorum_raft::command;
use quorum_raft::{FileJournal, Journal, JournalError, JournalOptions, NodeConfig, RaftNode, Role, Term};
use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

fn commands() -> Vec<Vec<u8>> {
    ["set a b", "set b c", "del a"]
        .into_iter()
        .map(|line| command::encode(line).unwrap())
        .collect()
}

#[test]
fn entries_survive_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.journal");
    {
        let mut journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
        for (i, cmd) in commands().into_iter().enumerate() {
            journal.append(cmd, i as u64 + 1, Term::new(1)).unwrap();
        }
        journal.set_commit_index(2);
        journal.close().unwrap();
    }

    let journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
    let stored: Vec<Vec<u8>> = journal.entries().iter().map(|e| e.command.clone()).collect();
    assert_eq!(stored, commands());
    assert_eq!(journal.commit_index(), 2);
    assert_eq!(
        command::decode(&journal.get(1).unwrap().command).unwrap().into_parts(),
        ("set".to_owned(), vec!["a".to_owned(), "b".to_owned()])
    );
}

#[test]
fn torn_tail_recovers_the_valid_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.journal");
    let mut record_ends = Vec::new();
    {
        let mut journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
        let mut end = 40;
        for (i, cmd) in commands().into_iter().enumerate() {
            end += 4 + 16 + cmd.len() + 4;
            record_ends.push(end as u64);
            journal.append(cmd, i as u64 + 1, Term::new(1)).unwrap();
        }
    }

    // cut the last record in half
    let cut = record_ends[1] + 10;
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(cut)
        .unwrap();

    let mut journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal.last_index(), Some(2));
    journal.append(command::encode("set z z").unwrap(), 3, Term::new(2)).unwrap();
    drop(journal);

    let journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
    assert_eq!(journal.len(), 3);
    assert_eq!(journal.get(3).unwrap().term, Term::new(2));
}

#[test]
fn only_one_writer_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.journal");
    let _writer = FileJournal::open(&path, JournalOptions::default()).unwrap();
    assert!(matches!(
        FileJournal::open(&path, JournalOptions::default()),
        Err(JournalError::Locked { .. })
    ));
}

#[test]
fn leadership_is_journaled_durably() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.journal");
    let config = NodeConfig::new("solo").with_journal(&path);
    let clock = ManualClock::new();
    let network = MemoryNetwork::new();
    {
        let journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
        let mut node = RaftNode::with_parts(
            &config,
            Box::new(network.join("solo")),
            Box::new(journal),
            Arc::new(clock.clone()),
        )
        .unwrap();
        clock.advance(Duration::from_secs(11));
        node.tick();
        node.tick();
        assert_eq!(node.role(), Role::Leader);
        node.close().unwrap();
    }

    let journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal.get(1).unwrap().term, Term::new(0));
    assert_eq!(journal.get(2).unwrap().term, Term::new(1));
    assert!(journal.entries().iter().all(|e| command::is_no_op(&e.command)));
}

#[test]
fn node_opens_the_configured_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("node.journal");
    let config = NodeConfig::new("solo").with_journal(&path);
    let network = MemoryNetwork::new();

    let mut node = RaftNode::new(&config, network.join("solo")).unwrap();
    assert_eq!(node.journal().len(), 1);
    node.close().unwrap();
    drop(node);

    let journal = FileJournal::open(&path, JournalOptions::default()).unwrap();
    assert_eq!(journal.len(), 1);
}
