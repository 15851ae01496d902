//! Item preparation: encryption under the view key, identifiers and attachments.

use crate::collector::{AttachedFile, ViewDataItem};
use crate::crypto::ContentCipher;
use crate::downloader::StagedRecord;
use crate::error::ProcessError;
use crate::item::NormalizedItem;
use crate::types::ResolvedJob;

/// Build the upload form of `item`, parsed from `record`
pub(crate) fn prepare_item(
    job: &ResolvedJob,
    record: &StagedRecord,
    item: &NormalizedItem,
    cipher: &dyn ContentCipher,
) -> Result<ViewDataItem, ProcessError> {
    let cleartext = item.cleartext().to_string();
    let mut encrypted_data = cipher
        .encrypt(&job.content_key, cleartext.as_bytes())
        .map_err(ProcessError::Encrypt)?;
    encrypted_data.key_id = Some(job.content_key.key_id.clone());

    let files = item
        .picture_url()
        .and_then(|url| record.files.as_ref()?.get(url))
        .map(|detail| vec![AttachedFile::from(detail)]);

    Ok(ViewDataItem {
        data_id: item.data_id(),
        feed_id: job.feed_id().to_string(),
        feed_view_id: job.feed_view_id().to_string(),
        encrypted_data,
        pub_date: item.date.saturating_mul(1000),
        group_id: item.group_id(),
        files,
    })
}
