use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::models::{LauncherConfigModel, PolicyAcceptanceRecord, PolicyDocumentState};
use crate::networking::DistributionClient;

/// Build the acceptance state of every required policy for this run.
///
/// A policy is accepted only when the locally recorded version equals the published one.
/// When the server cannot be reached the local record stands in, so an offline user who
/// accepted once is not locked out.
pub async fn refresh_policies(
    client: &DistributionClient,
    required: &[String],
    config: Option<&LauncherConfigModel>,
) -> Vec<PolicyDocumentState> {
    let mut states = Vec::with_capacity(required.len());
    for slug in required {
        let recorded = config.and_then(|c| c.accepted_policy_version(slug)).map(str::to_owned);
        let state = match client.get_latest_policy(slug).await {
            Ok(policy) => {
                let markdown = match client.download_policy(&policy).await {
                    Ok(markdown) => markdown,
                    Err(err) => {
                        warn!("policy: unable to download {} {}: {err}", policy.slug, policy.version);
                        String::new()
                    }
                };
                let accepted = recorded.as_deref().is_some_and(|v| v == policy.version)
                    || config
                        .and_then(|c| c.accepted_policy_version(&policy.slug))
                        .is_some_and(|v| v == policy.version);
                PolicyDocumentState {
                    requested_slug: slug.clone(),
                    resolved_slug: policy.slug,
                    title: policy.title,
                    version: policy.version,
                    markdown,
                    accepted,
                }
            }
            Err(err) => {
                warn!("policy: unable to resolve {slug}, using local record: {err}");
                PolicyDocumentState {
                    requested_slug: slug.clone(),
                    resolved_slug: slug.clone(),
                    title: slug.clone(),
                    accepted: recorded.is_some(),
                    version: recorded.unwrap_or_default(),
                    markdown: String::new(),
                }
            }
        };
        info!(
            "policy: {} v{} accepted={}",
            state.resolved_slug, state.version, state.accepted
        );
        states.push(state);
    }
    states
}

pub fn all_accepted(states: &[PolicyDocumentState]) -> bool {
    states.iter().all(|state| state.accepted)
}

/// Acceptance records for every listed policy, keyed by the resolved slug.
pub fn acceptance_records(
    states: &[PolicyDocumentState],
    accepted_at: DateTime<Utc>,
) -> BTreeMap<String, PolicyAcceptanceRecord> {
    states
        .iter()
        .filter(|state| !state.version.trim().is_empty())
        .map(|state| {
            (
                state.resolved_slug.to_lowercase(),
                PolicyAcceptanceRecord {
                    version: state.version.clone(),
                    accepted_at_utc: accepted_at,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with(slug: &str, version: &str) -> LauncherConfigModel {
        let mut config = LauncherConfigModel::default();
        config.accepted_policies.insert(
            slug.into(),
            PolicyAcceptanceRecord {
                version: version.into(),
                accepted_at_utc: Utc::now(),
            },
        );
        config
    }

    async fn mount_policy(server: &MockServer, slug: &str, version: &str) {
        let manifest = serde_json::json!({
            "schemaVersion": 1,
            "policy": slug,
            "version": version,
            "title": format!("{slug} title"),
        });
        Mock::given(method("GET"))
            .and(path(format!("/policies/{slug}/latest")))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/policies/{slug}/version/{version}/content")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("# {slug}")))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn accepted_only_when_versions_match() {
        let server = MockServer::start().await;
        mount_policy(&server, "eula", "3").await;
        let client = DistributionClient::new(&server.uri());
        let required = vec!["eula".to_string()];

        let states = refresh_policies(&client, &required, Some(&config_with("EULA", "3"))).await;
        assert!(all_accepted(&states));
        assert_eq!(states[0].markdown, "# eula");
        assert_eq!(states[0].title, "eula title");

        let states = refresh_policies(&client, &required, Some(&config_with("eula", "2"))).await;
        assert!(!all_accepted(&states));

        let states = refresh_policies(&client, &required, None).await;
        assert!(!states[0].accepted);
    }

    #[tokio::test]
    async fn unreachable_policy_falls_back_to_local_record() {
        let server = MockServer::start().await;
        let client = DistributionClient::new(&server.uri());
        let required = vec!["privacy".to_string()];

        let states = refresh_policies(&client, &required, Some(&config_with("privacy", "1"))).await;
        assert!(states[0].accepted);
        assert_eq!(states[0].version, "1");

        let states = refresh_policies(&client, &required, None).await;
        assert!(!states[0].accepted);
    }

    #[test]
    fn records_use_lowercase_resolved_slugs() {
        let states = vec![PolicyDocumentState {
            requested_slug: "EULA".into(),
            resolved_slug: "Eula".into(),
            title: "EULA".into(),
            version: "4".into(),
            markdown: String::new(),
            accepted: false,
        }];
        let now = Utc::now();
        let records = acceptance_records(&states, now);
        assert_eq!(records["eula"].version, "4");
        assert_eq!(records["eula"].accepted_at_utc, now);
    }
}
