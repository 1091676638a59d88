#![forbid(unsafe_code)]

use serde_json::json;
use tracing::{info, warn};

use parley_domain::{EntityKind, Identity, model};
use parley_store::{Mutation, Store, StoreError};

use super::Messaging;
use crate::ClientCoreError;
use crate::events::UiEvent;
use crate::remote::{RemoteRequest, UploadFile};

impl Messaging {
	/// Upload a file for the composer. A temporary attachment stands in while
	/// the upload runs and is replaced by the stored one once it succeeds.
	/// On failure the temporary attachment is removed and the user is told.
	pub async fn upload_attachment(&self, file: UploadFile) -> Result<Identity, ClientCoreError> {
		let Some(uploader) = self.uploader.clone() else {
			return Err(ClientCoreError::Other("no uploader configured".to_string()));
		};
		let filename = file.filename.clone();
		let temporary = self
			.apply(Mutation::CreateTemporaryAttachment {
				filename: filename.clone(),
				mimetype: file.mimetype.clone(),
			})?
			.into_identity()
			.ok_or_else(|| ClientCoreError::Other(format!("no temporary attachment for {filename}")))?;

		match uploader.upload(file).await {
			Ok(data) => {
				let stored = Identity::attachment(data.id);
				self.store.update(|store| {
					discard_temporary(store, &temporary)?;
					store.apply(Mutation::InsertAttachment(data))
				})?;
				info!(attachment = %stored, filename = %filename, "attachment uploaded");
				Ok(stored)
			}
			Err(err) => {
				warn!(filename = %filename, error = %err, "attachment upload failed");
				self.store.update(|store| discard_temporary(store, &temporary))?;
				self.emit(UiEvent::Error {
					message: format!("An error occurred while uploading {filename}."),
				});
				Err(err.into())
			}
		}
	}

	/// Remove an attachment. Temporary ones were never stored remotely.
	pub async fn unlink_attachment(&self, attachment: &Identity) -> Result<(), ClientCoreError> {
		let (id, temporary) = self.store.read(|store| {
			store
				.attachment(attachment)
				.map(|a| (a.id, a.is_temporary()))
				.ok_or_else(|| StoreError::Missing {
					kind: EntityKind::Attachment,
					identity: attachment.clone(),
				})
		})?;
		if !temporary {
			self.fetch(RemoteRequest::call(model::ATTACHMENT, "unlink", vec![json!([id])]))
				.await?;
		}
		self.apply(Mutation::DeleteAttachment(attachment.clone()))?;
		Ok(())
	}
}

/// The composer may have unlinked the placeholder while the upload ran.
fn discard_temporary(store: &mut Store, temporary: &Identity) -> Result<(), StoreError> {
	if store.attachment(temporary).is_some() {
		store.apply(Mutation::DeleteAttachment(temporary.clone()))?;
	}
	Ok(())
}
