//! Property-based tests over the HTTP surface and build aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use tagforge_api::BuildStatusAggregator;
use tagforge_core::{is_valid_version, BuildStatus, RunState, Tag, WorkflowRun};
use tagforge_test_utils::fixtures::{build_run_name, run_artifact, workflow_run};
use tagforge_test_utils::generators::{arb_raw_status, arb_tag_list};
use tagforge_test_utils::{ScriptedBuildSource, ScriptedTagSource};
use tokio::runtime::Runtime;

#[path = "support/app.rs"]
mod app_support;
use app_support::{client, get, test_app};

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn arb_runs() -> impl Strategy<Value = Vec<(u8, Option<String>, bool)>> {
    prop::collection::vec((0u8..4, arb_raw_status(), any::<bool>()), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// `/tags` returns exactly the valid names, newest first.
    #[test]
    fn prop_tags_route_is_sorted_valid_subset(names in arb_tag_list()) {
        let rt = test_runtime()?;
        let body = rt.block_on(async {
            let app = test_app(ScriptedTagSource::new(names.clone()), ScriptedBuildSource::new());
            app.json(get("/tags", client(1))?).await
        }).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let served: Vec<String> = serde_json::from_value(body.1)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let valid = names.iter().filter(|name| is_valid_version(name)).count();
        prop_assert_eq!(served.len(), valid);
        prop_assert!(served.iter().all(|name| is_valid_version(name)));

        let parsed: Vec<Tag> = served.iter().filter_map(|name| Tag::parse(name.as_str())).collect();
        for pair in parsed.windows(2) {
            prop_assert!(pair[0].cmp_precedence(&pair[1]) != std::cmp::Ordering::Less);
        }
    }

    /// Each version maps to its last classifiable run in listing order.
    #[test]
    fn prop_aggregator_last_classifiable_run_wins(runs in arb_runs()) {
        let mut source = ScriptedBuildSource::new();
        let mut expected: BTreeMap<String, (u64, BuildStatus)> = BTreeMap::new();

        for (index, (minor, status, has_artifact)) in runs.iter().enumerate() {
            let id = index as u64 + 1;
            let version = format!("1.{}.0", minor);
            let run = WorkflowRun {
                status: status.clone(),
                ..workflow_run(id, &build_run_name("X", &version), "")
            };
            let artifacts = if *has_artifact { vec![run_artifact(id * 100, false)] } else { vec![] };

            let classified = match RunState::from_raw(status.as_deref()) {
                RunState::Completed if *has_artifact => Some(BuildStatus::Completed),
                RunState::Completed => Some(BuildStatus::Expired),
                RunState::Active => Some(BuildStatus::InProgress),
                RunState::Other => None,
            };
            if let Some(classified) = classified {
                expected.insert(format!("v{}", version), (id, classified));
            }
            source = source.with_run(run, artifacts);
        }

        let rt = test_runtime()?;
        let aggregator = BuildStatusAggregator::new(Arc::new(source), "X");
        let builds = rt
            .block_on(aggregator.get_latest_builds())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(builds.len(), expected.len());
        for (key, (id, status)) in expected {
            let run = builds.get(&key).ok_or_else(|| TestCaseError::fail(format!("missing {}", key)))?;
            prop_assert_eq!(run.status, status);
            let expected_url = format!("https://github.com/owner/builds/actions/runs/{}", id);
            prop_assert_eq!(&run.url, &expected_url);
        }
    }
}
