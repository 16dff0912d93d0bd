//! Repository management and package discovery

mod common;

use common::*;
use corral_core::config::BUILTIN_REPO;
use corral_core::{Error, Repository};
use corral_packages::{AddOutcome, LifecycleState, PackageKind, PackageRegistry};
use proptest::prelude::*;

#[test]
fn test_add_new_repo_goes_first() {
    let fixtures = FixtureManager::new().unwrap();
    let first = fixtures.create_repo("first").unwrap();
    let second = fixtures.create_repo("second").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    assert_eq!(registry.add(&first, false).unwrap(), AddOutcome::Added);
    assert_eq!(registry.add(&second, false).unwrap(), AddOutcome::Added);

    let names: Vec<_> = registry.repos().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["second", "first"]);
}

#[test]
fn test_add_existing_repo_without_force_is_noop() {
    let fixtures = FixtureManager::new().unwrap();
    let repo = fixtures.create_repo("mine").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&repo, false).unwrap();
    let before = registry.repos().to_vec();

    assert_eq!(registry.add(&repo, false).unwrap(), AddOutcome::Unchanged);
    assert_eq!(registry.repos(), before.as_slice());
}

#[test]
fn test_add_existing_repo_with_force_updates_path_in_place() {
    let fixtures = FixtureManager::new().unwrap();
    let other = fixtures.create_repo("other").unwrap();
    let old = fixtures.create_repo("mine").unwrap();
    let moved_root = fixtures.temp_path().join("moved");
    std::fs::create_dir_all(moved_root.join("mine").join("mine")).unwrap();
    let new = moved_root.join("mine");

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&old, false).unwrap();
    registry.add(&other, false).unwrap();

    assert_eq!(registry.add(&new, true).unwrap(), AddOutcome::Updated);
    assert_eq!(registry.repos().len(), 2);
    assert_eq!(registry.repos()[1].name, "mine");
    assert_eq!(registry.repos()[1].path, new);
}

#[test]
fn test_add_repo_with_missing_path_is_repointed() {
    let fixtures = FixtureManager::new().unwrap();
    let repo = fixtures.create_repo("mine").unwrap();

    let mut registry = PackageRegistry::new(vec![Repository::new(
        "mine",
        fixtures.temp_path().join("gone").join("mine"),
    )]);
    assert_eq!(registry.add(&repo, false).unwrap(), AddOutcome::Updated);
    assert_eq!(registry.repos()[0].path, repo);
}

#[test]
fn test_add_without_namespace_dir_is_invalid_layout() {
    let fixtures = FixtureManager::new().unwrap();
    let bare = fixtures.create_bare_dir("bare").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    let err = registry.add(&bare, false).unwrap_err();
    assert!(matches!(err, Error::InvalidRepositoryLayout { .. }));
    assert!(registry.repos().is_empty());
}

#[test]
fn test_remove_keeps_files_on_disk() {
    let fixtures = FixtureManager::new().unwrap();
    let repo = fixtures.create_repo("mine").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&repo, false).unwrap();
    registry.remove("mine").unwrap();

    assert!(registry.repos().is_empty());
    assert!(repo.join("mine").is_dir());
    assert!(matches!(
        registry.remove("mine"),
        Err(Error::RepositoryNotFound { .. })
    ));
}

#[test]
fn test_list_repo_skips_underscore_entries() {
    let fixtures = FixtureManager::new().unwrap();
    let repo = fixtures.create_repo("mine").unwrap();
    fixtures.write_simple_package(&repo, "zeta_service").unwrap();
    fixtures.write_simple_package(&repo, "alpha").unwrap();
    std::fs::create_dir_all(repo.join("mine").join("_templates")).unwrap();
    std::fs::write(repo.join("mine").join("README.md"), "notes").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&repo, false).unwrap();
    let listing = registry.list_repo("mine").unwrap();

    assert!(listing.exists);
    assert_eq!(listing.package_types, vec!["alpha", "zeta_service"]);
}

#[test]
fn test_earlier_repo_shadows_later_repo() {
    let fixtures = FixtureManager::new().unwrap();
    let low = fixtures.create_repo("low").unwrap();
    let high = fixtures.create_repo("high").unwrap();
    fixtures.write_simple_package(&low, "hello_server").unwrap();
    fixtures.write_simple_package(&high, "hello_server").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&low, false).unwrap();
    registry.add(&high, false).unwrap();
    assert_eq!(registry.discover("hello_server").unwrap().repo, "high");

    registry.promote("low").unwrap();
    let discovered = registry.discover("hello_server").unwrap();
    assert_eq!(discovered.repo, "low");
    assert_eq!(discovered.kind, PackageKind::Scripted);
    assert_eq!(discovered.dir, low.join("low").join("hello_server"));
}

#[test]
fn test_class_mismatch_falls_through_to_next_repo() {
    let fixtures = FixtureManager::new().unwrap();
    let good = fixtures.create_repo("good").unwrap();
    let bad = fixtures.create_repo("bad").unwrap();
    fixtures.write_simple_package(&good, "hello_server").unwrap();
    fixtures
        .write_manifest(
            &bad,
            "hello_server",
            "class: Hello\nroles:\n  - name: server\n",
        )
        .unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&good, false).unwrap();
    registry.add(&bad, false).unwrap();

    assert_eq!(registry.repos()[0].name, "bad");
    assert_eq!(registry.discover("hello_server").unwrap().repo, "good");
}

#[test]
fn test_scripted_package_shadows_builtin() {
    let fixtures = FixtureManager::new().unwrap();
    let site = fixtures.create_repo("site").unwrap();
    fixtures
        .write_manifest(
            &site,
            "orangefs",
            "class: Orangefs\nroles:\n  - name: server\n",
        )
        .unwrap();

    let mut registry = PackageRegistry::with_builtins(vec![Repository::new(
        BUILTIN_REPO,
        fixtures.temp_path().join("no-builtin-files"),
    )]);
    assert_eq!(registry.discover("orangefs").unwrap().kind, PackageKind::Builtin);

    registry.add(&site, false).unwrap();
    let discovered = registry.discover("orangefs").unwrap();
    assert_eq!(discovered.repo, "site");
    assert_eq!(discovered.kind, PackageKind::Scripted);
}

#[test]
fn test_construct_returns_unconfigured_instance() {
    let fixtures = FixtureManager::new().unwrap();
    let repo = fixtures.create_repo("mine").unwrap();
    fixtures
        .write_manifest(&repo, "hello_server", HELLO_MANIFEST)
        .unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&repo, false).unwrap();
    let instance = registry.construct("hello_server").unwrap();

    assert_eq!(instance.state(), LifecycleState::Unconfigured);
    assert_eq!(instance.class_name(), "HelloServer");
    assert_eq!(instance.repo(), "mine");
    assert_eq!(instance.id(), "hello_server");
    assert!(instance.config().is_empty());
    assert_eq!(instance.schema().len(), 2);
}

#[test]
fn test_available_lists_each_type_once() {
    let fixtures = FixtureManager::new().unwrap();
    let a = fixtures.create_repo("a").unwrap();
    let b = fixtures.create_repo("b").unwrap();
    fixtures.write_simple_package(&a, "shared").unwrap();
    fixtures.write_simple_package(&b, "shared").unwrap();
    fixtures.write_simple_package(&b, "only_b").unwrap();

    let mut registry = PackageRegistry::new(Vec::new());
    registry.add(&b, false).unwrap();
    registry.add(&a, false).unwrap();

    let available = registry.available().unwrap();
    let pairs: Vec<_> = available
        .iter()
        .map(|d| (d.package_type.as_str(), d.repo.as_str()))
        .collect();
    assert_eq!(pairs, vec![("only_b", "b"), ("shared", "a")]);
}

fn unique_names() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::hash_set("[a-z]{1,8}", 1..8)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn prop_promote_moves_repo_first_and_keeps_others_in_order(
        names in unique_names(),
        pick in any::<prop::sample::Index>(),
    ) {
        let repos: Vec<Repository> = names
            .iter()
            .map(|n| Repository::new(n.clone(), format!("/nonexistent/{}", n)))
            .collect();
        let mut registry = PackageRegistry::new(repos);
        let chosen = names[pick.index(names.len())].clone();

        registry.promote(&chosen).unwrap();

        let after: Vec<String> = registry.repos().iter().map(|r| r.name.clone()).collect();
        prop_assert_eq!(&after[0], &chosen);
        let rest: Vec<String> = names.iter().filter(|n| **n != chosen).cloned().collect();
        prop_assert_eq!(&after[1..], rest.as_slice());
    }
}
