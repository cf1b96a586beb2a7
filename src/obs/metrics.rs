// self
use crate::{
	obs::{FlowKind, FlowOutcome},
	provider::ProviderErrorKind,
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_relay_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a single token provider call, labeled `ok` or by the classified failure.
pub fn record_provider_call(failure: Option<ProviderErrorKind>) {
	#[cfg(feature = "metrics")]
	{
		let result = failure.map(ProviderErrorKind::as_str).unwrap_or("ok");

		metrics::counter!("bearer_relay_provider_calls_total", "result" => result).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = failure;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_flow_outcome(FlowKind::Send, FlowOutcome::Failure);
		record_flow_outcome(FlowKind::Refresh, FlowOutcome::Joined);
		record_provider_call(None);
		record_provider_call(Some(ProviderErrorKind::ServerUnavailable));
	}
}
