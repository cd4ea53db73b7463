//! Per-zone range splitting

use async_trait::async_trait;
use tracing::info;

use nimbus_common::crd::reasons;
use nimbus_common::crd::types::{Condition, StatusState};
use nimbus_pipeline::{Action, Flow, HasScope, Signal, StatusPatch};

use crate::actions::retry;
use crate::state::IpRangeState;

/// Splits the effective CIDR into per-zone ranges, once
///
/// The block is cut into the minimal `2^k >= zones` equal sub-blocks and the
/// first `zones` land in `status.ranges`; the surplus stays unused. Ranges
/// already recorded are never recomputed, even if the Scope's zone list
/// changes later.
pub struct SplitRanges;

#[async_trait]
impl Action<IpRangeState> for SplitRanges {
    fn name(&self) -> &str {
        "splitRanges"
    }

    async fn run(&self, state: &mut IpRangeState) -> Flow {
        if !state.status_ranges().is_empty() {
            return None;
        }
        let Some(cidr) = state.allocated else {
            return Some(Signal::StopWithRequeue);
        };
        let zones = state
            .scope()
            .map(|s| s.spec.zones.len())
            .unwrap_or_default()
            .max(1);

        let blocks = match cidr.split(zones) {
            Ok(blocks) => blocks,
            Err(err) => {
                return StatusPatch::new()
                    .state(StatusState::Error)
                    .set_exclusive_conditions(vec![Condition::error(
                        reasons::CIDR_CAN_NOT_SPLIT,
                        format!("CIDR {cidr} can not be split into {zones} zones: {err}"),
                    )])
                    .error_log("failed to record split failure")
                    .run(state)
                    .await;
            }
        };
        let ranges: Vec<String> = blocks.iter().take(zones).map(|b| b.to_string()).collect();
        info!(cidr = %cidr, zones = zones, "split cidr into per-zone ranges");
        if let Some(obj) = state.obj_mut() {
            obj.status_mut().ranges = ranges;
        }
        if let Err(err) = state.persist_status().await {
            return retry(err, "persist ranges");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use nimbus_common::cidr::Cidr;

    // per-zone assignment over a /16 and three zones: four /18 blocks, the
    // first three used, the fourth dropped
    #[test]
    fn three_zones_take_three_of_four_quarters() {
        let cidr: Cidr = "10.0.0.0/16".parse().unwrap();
        let blocks = cidr.split(3).unwrap();
        assert_eq!(blocks.len(), 4);
        let ranges: Vec<String> = blocks.iter().take(3).map(|b| b.to_string()).collect();
        assert_eq!(
            ranges,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18"]
        );
    }
}
