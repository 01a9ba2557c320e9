use std::fs;

use zoo_core::storage::{JsonFilePersistence, MemoryPersistence, ProfilePersistence, StorageError};
use zoo_core::{ProfileDraft, ProfileError, ProfileState, ProfileStore};

mod common;
use common::fake_secrets::FakeSecrets;
use common::{harness_with, init_logs, tunnelled_draft};

#[test]
fn second_draft_with_the_same_address_is_a_duplicate() {
    init_logs();
    let persistence = MemoryPersistence::new();
    let mut store = ProfileStore::load(Box::new(persistence.clone())).unwrap();

    store
        .save(&ProfileDraft::new("localhost:2181"))
        .expect("first save succeeds");
    let err = store
        .save(&ProfileDraft::new("localhost:2181").with_acl("digest:a:b"))
        .unwrap_err();

    assert!(matches!(err, ProfileError::DuplicateProfile(ref id) if id == "localhost:2181"));
    assert_eq!(store.len(), 1);
    assert!(store.get("localhost:2181").unwrap().acl.is_empty());
    assert_eq!(persistence.snapshot().len(), 1);
}

#[test]
fn editing_a_saved_profile_updates_it_in_place() {
    init_logs();
    let mut store = ProfileStore::load(Box::new(MemoryPersistence::new())).unwrap();
    let saved = store.save(&ProfileDraft::new("localhost:2181")).unwrap();

    let mut edit = ProfileDraft::from_profile(&saved);
    assert!(!edit.is_new_draft());
    edit.acl_text = "world:anyone:cdrwa".into();
    store.save(&edit).expect("editing keeps the identifier");

    assert_eq!(store.len(), 1);
    assert_eq!(store.get("localhost:2181").unwrap().acl, vec!["world:anyone:cdrwa"]);
}

#[test]
fn changing_the_address_of_an_edit_creates_a_new_profile() {
    init_logs();
    let mut store = ProfileStore::load(Box::new(MemoryPersistence::new())).unwrap();
    let a = store.save(&ProfileDraft::new("zk-a:2181")).unwrap();
    store.save(&ProfileDraft::new("zk-b:2181")).unwrap();

    let mut edit = ProfileDraft::from_profile(&a);
    edit.server = "zk-c:2181".into();
    assert!(edit.is_new_draft());
    store.save(&edit).unwrap();
    assert_eq!(store.len(), 3);
    assert!(store.exists("zk-a:2181"));

    // ... and renaming onto a taken address is a duplicate.
    edit.server = "zk-b:2181".into();
    assert!(matches!(
        store.save(&edit),
        Err(ProfileError::DuplicateProfile(_))
    ));
}

#[test]
fn removing_an_unknown_profile_is_not_found() {
    init_logs();
    let mut store = ProfileStore::load(Box::new(MemoryPersistence::new())).unwrap();
    store.save(&ProfileDraft::new("localhost:2181")).unwrap();

    store.remove("localhost:2181").expect("first remove succeeds");
    assert!(!store.exists("localhost:2181"));
    assert!(matches!(
        store.remove("localhost:2181"),
        Err(ProfileError::NotFound(_))
    ));
}

#[test]
fn json_files_round_trip_without_connection_state() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;

    {
        let mut store = ProfileStore::load(Box::new(JsonFilePersistence::in_dir(dir.path())?))?;
        store.save(&tunnelled_draft("localhost:2181").with_acl("digest:test:test\nauth:test:test"))?;
        store.save(&ProfileDraft::new("zk-2:2181"))?;
    }

    let file = dir.path().join("localhost_2181.json");
    let json = fs::read_to_string(&file)?;
    assert!(json.contains("\"server\": \"localhost:2181\""));
    assert!(!json.contains("state"), "connection state must never be persisted");

    let reloaded = JsonFilePersistence::in_dir(dir.path())?.load_all()?;
    assert_eq!(reloaded.len(), 2);

    let store = ProfileStore::load(Box::new(JsonFilePersistence::in_dir(dir.path())?))?;
    let profile = store.get("localhost:2181").expect("profile survives reload");
    assert!(profile.ssh_enabled);
    assert_eq!(profile.ssh_password, "secret");
    assert_eq!(profile.acl, vec!["digest:test:test", "auth:test:test"]);
    Ok(())
}

#[test]
fn malformed_files_are_skipped() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("broken.json"), "{ not json")?;
    fs::write(dir.path().join("notes.txt"), "ignored")?;
    let mut persistence = JsonFilePersistence::in_dir(dir.path())?;
    persistence.persist(&ProfileDraft::new("localhost:2181").validate()?)?;

    let profiles = persistence.load_all()?;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].server, "localhost:2181");
    Ok(())
}

#[test]
fn deleting_removes_the_file() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;
    let mut store = ProfileStore::load(Box::new(JsonFilePersistence::in_dir(dir.path())?))?;
    store.save(&ProfileDraft::new("localhost:2181"))?;
    assert!(dir.path().join("localhost_2181.json").exists());

    store.remove("localhost:2181")?;
    assert!(!dir.path().join("localhost_2181.json").exists());
    Ok(())
}

#[tokio::test]
async fn reloaded_profiles_start_out_saved() {
    let persistence =
        MemoryPersistence::with_profiles([ProfileDraft::new("localhost:2181").validate().unwrap()]);
    let h = harness_with(persistence);

    assert_eq!(h.manager.state("localhost:2181"), Some(ProfileState::Saved));
    assert!(h.manager.session("localhost:2181").is_none());
}

#[test]
fn secret_store_keeps_passwords_out_of_the_json_files() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;
    let secrets = FakeSecrets::new();

    {
        let persistence = JsonFilePersistence::in_dir(dir.path())?.with_secrets(secrets.clone());
        let mut store = ProfileStore::load(Box::new(persistence))?;
        store.save(&tunnelled_draft("localhost:2181"))?;
    }

    let json = fs::read_to_string(dir.path().join("localhost_2181.json"))?;
    assert!(!json.contains("secret"));
    assert_eq!(secrets.get("localhost:2181").as_deref(), Some("secret"));

    let reloaded = JsonFilePersistence::in_dir(dir.path())?
        .with_secrets(secrets)
        .load_all()?;
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].ssh_password, "secret");
    Ok(())
}

#[test]
fn clearing_the_password_drops_the_stored_secret() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;
    let secrets = FakeSecrets::new();
    let mut persistence = JsonFilePersistence::in_dir(dir.path())?.with_secrets(secrets.clone());

    let mut profile = tunnelled_draft("localhost:2181").validate()?;
    persistence.persist(&profile)?;
    assert!(secrets.get("localhost:2181").is_some());

    profile.ssh_enabled = false;
    profile.ssh_password.clear();
    persistence.persist(&profile)?;
    assert_eq!(secrets.get("localhost:2181"), None);

    let reloaded = persistence.load_all()?;
    assert_eq!(reloaded, vec![profile]);
    Ok(())
}

#[test]
fn unavailable_secret_store_does_not_hide_profiles_without_a_tunnel() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;
    let secrets = FakeSecrets::new();
    let mut persistence = JsonFilePersistence::in_dir(dir.path())?.with_secrets(secrets.clone());
    persistence.persist(&ProfileDraft::new("plain:2181").validate()?)?;
    secrets.make_unavailable();

    let profiles = persistence.load_all()?;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].server, "plain:2181");
    Ok(())
}

#[test]
fn unavailable_secret_store_is_reported_for_tunnelled_profiles() -> anyhow::Result<()> {
    init_logs();
    let dir = tempfile::tempdir()?;
    let secrets = FakeSecrets::new();
    let mut persistence = JsonFilePersistence::in_dir(dir.path())?.with_secrets(secrets.clone());
    persistence.persist(&ProfileDraft::new("plain:2181").validate()?)?;
    persistence.persist(&tunnelled_draft("localhost:2181").validate()?)?;
    secrets.make_unavailable();

    let err = persistence.load_all().unwrap_err();
    assert!(matches!(err, StorageError::Keyring(_)));

    let err = ProfileStore::load(Box::new(persistence)).err().expect("store load fails");
    assert!(matches!(err, ProfileError::Storage(_)));
    Ok(())
}
