//! Bundled ecosystem strategies and the default rule set that wires them up.
//!
//! - [`cargo`] — `cargo tree` and `Cargo.lock`.
//! - [`npm`] — `package-lock.json`, `yarn.lock` and `package.json`.
//! - [`maven`] — `mvn dependency:tree` and `pom.xml`.
//! - [`python`] — `Pipfile.lock` and `requirements.txt`.
//! - [`executable`] — locating and running external build tools.

use crate::detector::{
    Detectable, DetectableAccuracy, DetectableDefinition, DetectableEnvironment, DetectorRule, DetectorRuleSet,
    EntryPoint, RuleSetError,
};
use crate::models::Forge;

pub mod cargo;
pub mod executable;
pub mod maven;
pub mod npm;
pub mod python;

use cargo::{CargoCliDetectable, CargoLockfileDetectable};
use maven::{MavenCliDetectable, MavenPomDetectable};
use npm::{NpmPackageJsonDetectable, NpmPackageLockDetectable, YarnLockDetectable};
use python::{PipRequirementsDetectable, PipenvLockDetectable};

use DetectableAccuracy::{High, Low};

fn definition<D, F>(name: &str, accuracy: DetectableAccuracy, group: Forge, create: F) -> DetectableDefinition
where
    D: Detectable + 'static,
    F: Fn(&DetectableEnvironment) -> D + Send + Sync + 'static,
{
    DetectableDefinition::new(name, accuracy, move |env| Box::new(create(env))).with_group(group)
}

/// Every bundled strategy, in the order the engine should try them.
pub fn default_rule_set() -> Result<DetectorRuleSet, RuleSetError> {
    let cargo_cli = definition("Cargo CLI", High, Forge::Cargo, CargoCliDetectable::new);
    let cargo_lockfile = definition("Cargo Lockfile", High, Forge::Cargo, CargoLockfileDetectable::new);
    let npm_package_lock = definition("Npm Package Lock", High, Forge::Npm, NpmPackageLockDetectable::new);
    let yarn_lock = definition("Yarn Lock", High, Forge::Npm, YarnLockDetectable::new);
    let npm_package_json = definition("Npm Package Json", Low, Forge::Npm, NpmPackageJsonDetectable::new);
    let maven_cli = definition("Maven CLI", High, Forge::Maven, MavenCliDetectable::new);
    let maven_pom = definition("Maven Pom", Low, Forge::Maven, MavenPomDetectable::new);
    let pipenv_lock = definition("Pipenv Lock", High, Forge::Pypi, PipenvLockDetectable::new);
    let pip_requirements = definition("Pip Requirements", Low, Forge::Pypi, PipRequirementsDetectable::new);

    DetectorRuleSet::builder()
        // Workspace roots already report their members.
        .add(DetectorRule::new("CARGO").entry_point(
            EntryPoint::new(cargo_cli)
                .fallback(cargo_lockfile)
                .not_nestable(),
        ))
        .add(DetectorRule::new("NPM_PACKAGE_LOCK").entry_point(EntryPoint::new(npm_package_lock)))
        .add(DetectorRule::new("YARN").entry_point(EntryPoint::new(yarn_lock)))
        .add(
            DetectorRule::new("NPM_PACKAGE_JSON")
                .entry_point(EntryPoint::new(npm_package_json))
                .yields_to("NPM_PACKAGE_LOCK")
                .yields_to("YARN"),
        )
        .add(DetectorRule::new("MAVEN").entry_point(
            EntryPoint::new(maven_cli)
                .fallback(maven_pom)
                .not_nestable(),
        ))
        .add(
            DetectorRule::new("PIP")
                .entry_point(EntryPoint::new(pipenv_lock))
                .entry_point(EntryPoint::new(pip_requirements)),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorType;

    #[test]
    fn test_default_rule_set_builds() {
        let rules = default_rule_set().unwrap();
        assert_eq!(rules.len(), 6);

        let position = |name: &str| {
            rules
                .rules()
                .iter()
                .position(|r| r.detector_type() == &DetectorType::from(name))
                .unwrap()
        };
        assert!(position("NPM_PACKAGE_LOCK") < position("NPM_PACKAGE_JSON"));
        assert!(position("YARN") < position("NPM_PACKAGE_JSON"));
    }

    #[test]
    fn test_default_entry_points() {
        let rules = default_rule_set().unwrap();

        let cargo = rules.get(&DetectorType::from("CARGO")).unwrap();
        let names: Vec<_> = cargo.entry_points()[0].definitions().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Cargo CLI", "Cargo Lockfile"]);
        assert_eq!(cargo.entry_points()[0].primary().group(), Some(Forge::Cargo));

        let pip = rules.get(&DetectorType::from("PIP")).unwrap();
        let names: Vec<_> = pip.entry_points().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["Pipenv Lock", "Pip Requirements"]);
    }
}
