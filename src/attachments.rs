use crate::error::OversizeAttachment;
use crate::models::Attachment;

/// Hard per-file ceiling (10 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Result of filtering a batch of uploaded files.
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub accepted: Vec<Attachment>,
    pub rejected: Vec<OversizeAttachment>,
}

/// Split `files` into those under the ceiling and per-file rejections.
/// Order of accepted files is preserved.
pub fn intake(files: impl IntoIterator<Item = Attachment>) -> IntakeReport {
    let mut report = IntakeReport::default();
    for file in files {
        match check_size(&file) {
            Ok(()) => report.accepted.push(file),
            Err(rejection) => {
                log::warn!("{rejection}");
                report.rejected.push(rejection);
            }
        }
    }
    report
}

/// Measured on the payload itself; `size_bytes` is caller-supplied.
pub fn check_size(file: &Attachment) -> Result<(), OversizeAttachment> {
    let size_bytes = file.data.len() as u64;
    if size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(OversizeAttachment {
            filename: file.filename.clone(),
            size_bytes,
            limit: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(())
}
