#![forbid(unsafe_code)]

use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use parley_domain::{Identity, PartnerFields};
use parley_store::Mutation;

use super::Messaging;
use crate::ClientCoreError;
use crate::remote::RemoteRequest;

pub const IM_STATUS_ROUTE: &str = "/longpolling/im_status";

#[derive(Debug, Deserialize)]
struct ImStatus {
	id: i64,
	im_status: String,
}

impl Messaging {
	/// Refresh the im-status of every partner that already shows one.
	/// Returns how many partners were updated.
	pub async fn fetch_partner_im_status(&self) -> Result<usize, ClientCoreError> {
		let mut partner_ids: Vec<i64> = self.store.read(|store| {
			store
				.partners()
				.filter(|p| p.im_status.is_some())
				.map(|p| p.id)
				.collect()
		});
		if partner_ids.is_empty() {
			return Ok(0);
		}
		partner_ids.sort_unstable();

		let statuses: Vec<ImStatus> = self
			.fetch_as(
				"im status list",
				RemoteRequest::route(IM_STATUS_ROUTE, json!({ "partner_ids": partner_ids })),
			)
			.await?;
		let updated = statuses.len();
		self.store.update(|store| {
			for status in statuses {
				let partner = Identity::partner(status.id);
				if store.partner(&partner).is_none() {
					continue;
				}
				store.apply(Mutation::UpdatePartner {
					partner,
					changes: PartnerFields {
						im_status: Some(status.im_status),
						..PartnerFields::default()
					},
				})?;
			}
			Ok::<_, ClientCoreError>(())
		})?;
		debug!(updated, "im status refreshed");
		Ok(updated)
	}

	/// Poll im-status on the configured interval until `shutdown_rx` fires.
	/// A failed poll is logged and retried on the next tick.
	pub async fn run_im_status_poller(&self, mut shutdown_rx: oneshot::Receiver<()>) {
		let mut tick = tokio::time::interval(self.presence.im_status_interval);
		tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
		loop {
			tokio::select! {
				_ = &mut shutdown_rx => {
					info!("im status poller stopped");
					break;
				}
				_ = tick.tick() => {
					if let Err(err) = self.fetch_partner_im_status().await {
						warn!(error = %err, "im status poll failed");
					}
				}
			}
		}
	}
}
