/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;

use rstest::*;

use common::*;
use repo_format::format::{
    peek_info, BlobLayout, CreateOptions, FormatManager, ResourceLimit, Retention, RetentionMode,
    RotationPhase,
};
use repo_format::signing::SigningKeyring;
use repo_format::store::{
    BlobId, BlobStore, MemoryConfig, OpenStore, BLOB_LAYOUT_BLOB_ID, CONTROL_BLOB_IDS,
    REPOSITORY_BLOB_ID,
};
use repo_format::{Error, Secret};

mod common;

/// The size of an XChaCha20-Poly1305 key in bytes.
const KEY_SIZE: usize = 32;

#[rstest]
fn create_then_open_returns_same_config(repo: TestRepo) -> anyhow::Result<()> {
    let reopened = repo.reopen(OLD_PASSWORD)?;

    assert_eq!(reopened.config(), repo.manager.config());
    assert_eq!(reopened.blob_layout(), repo.manager.blob_layout());
    assert_eq!(reopened.unique_id(), repo.manager.unique_id());
    assert_eq!(reopened.kdf_params(), repo.manager.kdf_params());
    Ok(())
}

#[test]
fn configure_and_create_new_repo() -> anyhow::Result<()> {
    let retention = Retention {
        mode: RetentionMode::Compliance,
        period_secs: 60 * 60 * 24,
    };
    let layout = BlobLayout {
        shards: vec![2],
        retention: None,
    };
    let repo = TestRepo::create(
        CreateOptions::new()
            .memory_limit(ResourceLimit::Interactive)
            .operations_limit(ResourceLimit::Interactive)
            .max_pack_size(1024 * 1024)
            .blob_layout(layout)
            .retention(Some(retention)),
    )?;

    let reopened = repo.reopen(OLD_PASSWORD)?;

    assert_eq!(reopened.config().max_pack_size, 1024 * 1024);
    assert_eq!(reopened.blob_layout().shards, vec![2]);
    assert_eq!(reopened.blob_layout().retention, Some(retention));
    Ok(())
}

#[rstest]
fn creating_existing_repo_errs(repo: TestRepo) -> anyhow::Result<()> {
    let result = CreateOptions::new().create(repo.store_config.open()?, Secret::new("other"));
    assert!(matches!(result, Err(Error::AlreadyExists)));
    Ok(())
}

#[test]
fn opening_nonexistent_repo_errs() -> anyhow::Result<()> {
    let store_config = MemoryConfig::new();
    let result = FormatManager::open(store_config.open()?, Secret::new(OLD_PASSWORD));
    assert!(matches!(result, Err(Error::NotFound)));
    Ok(())
}

#[test]
fn creating_with_empty_password_errs() -> anyhow::Result<()> {
    let store_config = MemoryConfig::new();
    let result = CreateOptions::new().create(store_config.open()?, Secret::new(""));
    assert!(matches!(result, Err(Error::EmptyPassword)));
    assert!(store_config.open()?.list_blobs()?.is_empty());
    Ok(())
}

#[rstest]
fn opening_with_wrong_password_errs(repo: TestRepo) {
    assert!(matches!(repo.reopen("wrong"), Err(Error::Password)));
}

#[rstest]
fn peek_info_does_not_need_password(repo: TestRepo) -> anyhow::Result<()> {
    let info = peek_info(&mut repo.store_config.open()?)?;
    assert_eq!(info.id(), repo.manager.unique_id());
    assert_eq!(info, repo.manager.info());
    Ok(())
}

#[rstest]
fn rotate_password_from_old_to_new(repo: TestRepo) -> anyhow::Result<()> {
    let original_config = repo.manager.config();
    let original_blobs = repo.control_blobs()?;
    for id in CONTROL_BLOB_IDS.iter() {
        repo.manager.read_control_blob(id)?;
    }
    assert_eq!(repo.manager.cache_stats().entries, 2);

    let callback = RecordingCallback::default();
    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback)?;

    // Both blobs were rewritten.
    let rotated_blobs = repo.control_blobs()?;
    assert_ne!(rotated_blobs[0], original_blobs[0]);
    assert_ne!(rotated_blobs[1], original_blobs[1]);

    assert_eq!(callback.calls(), vec![call(OLD_PASSWORD, NEW_PASSWORD)]);
    assert_eq!(repo.manager.cache_stats().entries, 0);
    assert!(repo.manager.verify_password(&Secret::new(NEW_PASSWORD)));
    assert!(!repo.manager.verify_password(&Secret::new(OLD_PASSWORD)));
    assert!(!repo.manager.has_pending_signing_update());

    assert!(matches!(repo.reopen(OLD_PASSWORD), Err(Error::Password)));
    let reopened = repo.reopen(NEW_PASSWORD)?;
    assert_eq!(reopened.config(), original_config);
    assert_eq!(reopened.unique_id(), repo.manager.unique_id());
    Ok(())
}

#[rstest]
fn rotation_keeps_key_derivation_parameters(repo: TestRepo) -> anyhow::Result<()> {
    let params = repo.manager.kdf_params();
    let old_key = repo.manager.with_key(|key| key.clone());

    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &RecordingCallback::default())?;

    assert_eq!(repo.manager.kdf_params(), params);
    assert_ne!(repo.manager.with_key(|key| key.clone()), old_key);
    Ok(())
}

#[rstest]
fn rotating_without_capability_changes_nothing(locked_repo: TestRepo) -> anyhow::Result<()> {
    let repo = locked_repo;
    repo.manager.read_control_blob(&REPOSITORY_BLOB_ID)?;
    let blobs = repo.control_blobs()?;
    let key = repo.manager.with_key(|key| key.clone());
    let cache_stats = repo.manager.cache_stats();
    let puts = repo.faults.puts();
    let callback = RecordingCallback::default();

    let result = repo
        .manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback);

    assert!(!repo.manager.supports_password_change());
    assert!(matches!(result, Err(Error::Capability)));
    assert_eq!(
        result.unwrap_err().phase(),
        Some(RotationPhase::Capability)
    );
    assert_eq!(repo.control_blobs()?, blobs);
    assert_eq!(repo.faults.puts(), puts);
    assert_eq!(repo.manager.with_key(|key| key.clone()), key);
    assert!(repo.manager.verify_password(&Secret::new(OLD_PASSWORD)));
    assert_eq!(repo.manager.cache_stats(), cache_stats);
    assert!(callback.calls().is_empty());
    repo.reopen(OLD_PASSWORD)?;
    Ok(())
}

#[rstest]
fn rotating_to_empty_password_errs(repo: TestRepo) -> anyhow::Result<()> {
    let blobs = repo.control_blobs()?;
    let result = repo
        .manager
        .rotate_password(Secret::new(""), &RecordingCallback::default());
    assert!(matches!(result, Err(Error::EmptyPassword)));
    assert_eq!(repo.control_blobs()?, blobs);
    Ok(())
}

#[rstest]
fn rotating_to_current_password_does_nothing(repo: TestRepo) -> anyhow::Result<()> {
    let puts = repo.faults.puts();
    let callback = RecordingCallback::default();

    repo.manager
        .rotate_password(Secret::new(OLD_PASSWORD), &callback)?;

    assert_eq!(repo.faults.puts(), puts);
    assert!(callback.calls().is_empty());
    Ok(())
}

#[rstest]
fn cache_misses_after_rotation_until_refetched(repo: TestRepo) -> anyhow::Result<()> {
    for id in CONTROL_BLOB_IDS.iter() {
        repo.manager.read_control_blob(id)?;
        repo.manager.read_control_blob(id)?;
    }
    let before = repo.manager.cache_stats();
    assert_eq!(before.hits, 2);
    assert_eq!(repo.manager.cache().stats().entries, 2);

    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &RecordingCallback::default())?;
    assert_eq!(repo.manager.cache().stats().entries, 0);

    let gets = repo.faults.gets();
    let refetched = CONTROL_BLOB_IDS
        .iter()
        .map(|id| repo.manager.read_control_blob(id))
        .collect::<repo_format::Result<Vec<_>>>()?;
    let after = repo.manager.cache_stats();
    assert_eq!(after.misses, before.misses + 2);
    assert_eq!(after.hits, before.hits);
    assert_eq!(repo.faults.gets(), gets + 2);

    // The refetched blobs decrypt only under the new password.
    let copy = MemoryConfig::new();
    let mut store = copy.open()?;
    for (id, bytes) in CONTROL_BLOB_IDS.iter().zip(&refetched) {
        store.put_blob(id, bytes)?;
    }
    assert!(matches!(
        FormatManager::open(copy.open()?, Secret::new(OLD_PASSWORD)),
        Err(Error::Password)
    ));
    FormatManager::open(copy.open()?, Secret::new(NEW_PASSWORD))?;
    Ok(())
}

#[rstest]
fn reading_non_control_blob_errs(repo: TestRepo) {
    let id = BlobId::for_content(b"content");
    assert!(matches!(
        repo.manager.read_control_blob(&id),
        Err(Error::NotControlBlob(_))
    ));
}

#[rstest]
fn repository_write_failure_restores_old_state(repo: TestRepo) -> anyhow::Result<()> {
    let blobs = repo.control_blobs()?;
    let callback = RecordingCallback::default();
    repo.faults.fail_puts_to(REPOSITORY_BLOB_ID);

    let result = repo
        .manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback);

    match result {
        Err(error @ Error::Persistence { .. }) => {
            assert_eq!(error.phase(), Some(RotationPhase::RepositoryWrite))
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(repo.control_blobs()?, blobs);
    assert!(repo.manager.verify_password(&Secret::new(OLD_PASSWORD)));
    assert!(callback.calls().is_empty());
    repo.reopen(OLD_PASSWORD)?;

    repo.faults.heal();
    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback)?;
    repo.reopen(NEW_PASSWORD)?;
    assert_eq!(callback.calls(), vec![call(OLD_PASSWORD, NEW_PASSWORD)]);
    Ok(())
}

#[rstest]
fn blob_layout_write_failure_changes_nothing(repo: TestRepo) -> anyhow::Result<()> {
    let blobs = repo.control_blobs()?;
    repo.faults.fail_puts_to(BLOB_LAYOUT_BLOB_ID);

    let result = repo
        .manager
        .rotate_password(Secret::new(NEW_PASSWORD), &RecordingCallback::default());

    assert_eq!(
        result.unwrap_err().phase(),
        Some(RotationPhase::BlobLayoutWrite)
    );
    assert_eq!(repo.control_blobs()?, blobs);
    assert!(repo.manager.verify_password(&Secret::new(OLD_PASSWORD)));
    Ok(())
}

#[rstest]
fn rotation_repairs_store_after_failed_restore(repo: TestRepo) -> anyhow::Result<()> {
    // The blob-layout write succeeds, but the repository write and the restore both fail.
    repo.faults.fail_puts_after(1);

    let result = repo
        .manager
        .rotate_password(Secret::new(NEW_PASSWORD), &RecordingCallback::default());

    assert!(matches!(result, Err(Error::Persistence { .. })));
    assert!(repo.manager.verify_password(&Secret::new(OLD_PASSWORD)));
    assert!(matches!(repo.reopen(OLD_PASSWORD), Err(Error::Corrupt)));

    repo.faults.heal();
    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &RecordingCallback::default())?;
    repo.reopen(NEW_PASSWORD)?;
    Ok(())
}

#[rstest]
fn callback_failure_is_retried(repo: TestRepo) -> anyhow::Result<()> {
    let callback = RecordingCallback::failing();

    let result = repo
        .manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback);

    match result {
        Err(error @ Error::Callback(_)) => {
            assert_eq!(error.phase(), Some(RotationPhase::Callback))
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // The control blobs were already rotated.
    assert!(repo.manager.verify_password(&Secret::new(NEW_PASSWORD)));
    assert!(repo.manager.has_pending_signing_update());
    repo.reopen(NEW_PASSWORD)?;

    let puts = repo.faults.puts();
    callback.set_failing(false);
    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback)?;

    assert_eq!(repo.faults.puts(), puts);
    assert!(!repo.manager.has_pending_signing_update());
    assert_eq!(
        callback.calls(),
        vec![
            call(OLD_PASSWORD, NEW_PASSWORD),
            call(OLD_PASSWORD, NEW_PASSWORD)
        ]
    );
    Ok(())
}

#[rstest]
fn panicking_callback_is_retried(repo: TestRepo) -> anyhow::Result<()> {
    let panicking = |_: &Secret, _: &Secret| -> anyhow::Result<()> { panic!("signing failed") };

    let result = catch_unwind(AssertUnwindSafe(|| {
        repo.manager
            .rotate_password(Secret::new(NEW_PASSWORD), &panicking)
    }));

    assert!(result.is_err());
    assert!(repo.manager.verify_password(&Secret::new(NEW_PASSWORD)));
    assert!(repo.manager.has_pending_signing_update());

    let puts = repo.faults.puts();
    let callback = RecordingCallback::default();
    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback)?;

    assert_eq!(repo.faults.puts(), puts);
    assert!(!repo.manager.has_pending_signing_update());
    assert_eq!(callback.calls(), vec![call(OLD_PASSWORD, NEW_PASSWORD)]);
    Ok(())
}

#[rstest]
fn rotation_after_failed_callback_passes_pending_password(repo: TestRepo) -> anyhow::Result<()> {
    let callback = RecordingCallback::failing();
    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &callback)
        .unwrap_err();

    callback.set_failing(false);
    repo.manager
        .rotate_password(Secret::new("third-pw"), &callback)?;

    assert_eq!(
        callback.calls(),
        vec![
            call(OLD_PASSWORD, NEW_PASSWORD),
            call(OLD_PASSWORD, "third-pw")
        ]
    );
    repo.reopen("third-pw")?;
    Ok(())
}

#[rstest]
fn signing_keyring_follows_rotation(repo: TestRepo) -> anyhow::Result<()> {
    let keyring = SigningKeyring::new(
        "repo-format test manifest signing",
        repo.manager.unique_id(),
        Secret::new(OLD_PASSWORD),
    );
    let signature = keyring.sign(b"manifest");

    repo.manager
        .rotate_password(Secret::new(NEW_PASSWORD), &keyring)?;

    let expected = SigningKeyring::new(
        "repo-format test manifest signing",
        repo.manager.unique_id(),
        Secret::new(NEW_PASSWORD),
    );
    assert!(!keyring.verify(b"manifest", &signature));
    assert!(expected.verify(b"manifest", &keyring.sign(b"manifest")));
    Ok(())
}

#[rstest]
fn signing_keyring_with_wrong_password_fails_callback(repo: TestRepo) {
    let keyring = SigningKeyring::new(
        "repo-format test manifest signing",
        repo.manager.unique_id(),
        Secret::new("not the password"),
    );

    let result = repo
        .manager
        .rotate_password(Secret::new(NEW_PASSWORD), &keyring);

    assert!(matches!(result, Err(Error::Callback(_))));
    assert!(repo.manager.has_pending_signing_update());
}

#[rstest]
fn concurrent_rotations_persist_exactly_one_password(repo: TestRepo) -> anyhow::Result<()> {
    let TestRepo {
        store_config,
        manager,
        ..
    } = repo;
    let manager = Arc::new(manager);
    let original_config = manager.config();
    let barrier = Arc::new(Barrier::new(4));
    let mut rotations = Vec::new();
    let mut readers = Vec::new();

    for password in ["pw-a", "pw-b"] {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        rotations.push(thread::spawn(move || {
            barrier.wait();
            let callback = |_: &Secret, _: &Secret| -> anyhow::Result<()> { Ok(()) };
            manager.rotate_password(Secret::new(password), &callback)
        }));
    }

    for _ in 0..2 {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        readers.push(thread::spawn(move || {
            barrier.wait();
            (0..20)
                .map(|_| {
                    manager.with_credentials(|password, key, config| {
                        (password.clone(), key.clone(), config.clone())
                    })
                })
                .collect::<Vec<_>>()
        }));
    }

    for handle in rotations {
        handle.join().unwrap()?;
    }

    // The key derivation parameters don't change on rotation, so every sampled key must be the one
    // derived from the sampled password.
    let kdf = manager.kdf_params();
    for handle in readers {
        for (password, key, config) in handle.join().unwrap() {
            assert_eq!(config, original_config);
            assert_eq!(kdf.derive_key(&password, KEY_SIZE)?, key);
        }
    }

    let opened_a = FormatManager::open(store_config.open()?, Secret::new("pw-a")).is_ok();
    let opened_b = FormatManager::open(store_config.open()?, Secret::new("pw-b")).is_ok();
    assert!(opened_a ^ opened_b);
    assert_eq!(manager.verify_password(&Secret::new("pw-a")), opened_a);
    assert!(matches!(
        FormatManager::open(store_config.open()?, Secret::new(OLD_PASSWORD)),
        Err(Error::Password)
    ));
    Ok(())
}

#[rstest]
fn refresh_detects_rotation_by_other_process(repo: TestRepo) -> anyhow::Result<()> {
    repo.manager.refresh()?;

    let other = repo.reopen(OLD_PASSWORD)?;
    other.rotate_password(Secret::new(NEW_PASSWORD), &RecordingCallback::default())?;

    assert!(matches!(repo.manager.refresh(), Err(Error::Password)));
    Ok(())
}

#[rstest]
fn refresh_clears_cached_control_blobs(repo: TestRepo) -> anyhow::Result<()> {
    repo.manager.read_control_blob(&BLOB_LAYOUT_BLOB_ID)?;
    assert_eq!(repo.manager.cache_stats().entries, 1);

    repo.manager.refresh()?;

    assert_eq!(repo.manager.cache_stats().entries, 0);
    Ok(())
}

#[rstest]
fn tampered_blob_layout_is_corrupt(repo: TestRepo) -> anyhow::Result<()> {
    let mut store = repo.store_config.open()?;
    let mut bytes = store.get_blob(&BLOB_LAYOUT_BLOB_ID)?.unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    store.put_blob(&BLOB_LAYOUT_BLOB_ID, &bytes)?;

    assert!(matches!(repo.reopen(OLD_PASSWORD), Err(Error::Corrupt)));
    assert!(matches!(repo.manager.refresh(), Err(Error::Corrupt)));
    Ok(())
}

#[rstest]
fn debug_output_does_not_contain_password(repo: TestRepo) {
    let output = format!("{:?}", repo.manager);
    assert!(!output.contains(OLD_PASSWORD));
}
