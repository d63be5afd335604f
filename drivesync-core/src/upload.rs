use serde::Serialize;
use serde_json::json;

pub(crate) const MULTIPART_BOUNDARY: &str = "drivesync_upload_boundary";

/// Metadata body for a plain folder create.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
    pub modified_time: String,
}

/// The two upload request shapes share one contract at the client boundary:
/// a metadata JSON body and a create-or-update dispatch. Both the multipart
/// and the resumable paths consume this and nothing else.
#[derive(Debug, Clone)]
pub enum UploadTarget {
    Create {
        id: String,
        name: String,
        parents: Vec<String>,
        modified_time: String,
    },
    Update {
        id: String,
        modified_time: String,
    },
}

impl UploadTarget {
    pub fn id(&self) -> &str {
        match self {
            UploadTarget::Create { id, .. } => id,
            UploadTarget::Update { id, .. } => id,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, UploadTarget::Create { .. })
    }

    pub fn metadata_json(&self) -> String {
        match self {
            UploadTarget::Create {
                id,
                name,
                parents,
                modified_time,
            } => json!({
                "id": id,
                "name": name,
                "parents": parents,
                "modifiedTime": modified_time,
            })
            .to_string(),
            UploadTarget::Update { modified_time, .. } => {
                json!({ "modifiedTime": modified_time }).to_string()
            }
        }
    }
}

/// Builds the two-part `multipart/related` body used by the small-file
/// path: a JSON metadata part followed by the raw content part.
pub(crate) fn multipart_related_body(metadata_json: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata_json.len() + content.len() + 256);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--").as_bytes());
    body
}

/// Parses the final acknowledged byte out of a session-status `Range`
/// header. Accepts both `bytes=0-N` and the bare `0-N` form.
pub(crate) fn acknowledged_range_end(header: &str) -> Option<u64> {
    let range = header.trim().trim_start_matches("bytes=");
    let (_, end) = range.split_once('-')?;
    end.trim().parse().ok()
}
