//! Console reporting for a run

use tracing::{info, warn};

use crate::models::{ItemOutcome, RunReport, RunResult};

/// Log one record's outcome as it happens.
pub fn log_outcome(id: usize, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::NoImage => info!("[{}] No image URL, skipping", id),
        ItemOutcome::DownloadFailed(err) => {
            warn!("[{}] Download failed ({}): {}", id, err.kind(), err)
        }
        ItemOutcome::Downloaded { original } => {
            info!("[{}] Downloaded {}", id, original.display())
        }
        ItemOutcome::Enriched { processed, .. } => {
            info!("[{}] Background removed: {}", id, processed.display())
        }
        ItemOutcome::EnrichFailed { error, .. } => {
            warn!("[{}] Background removal failed ({}): {}", id, error.kind(), error)
        }
    }
}

/// Attempted / succeeded / failed lines for both phases.
pub fn phase_lines(result: &RunResult) -> [String; 2] {
    [
        format!(
            "Images: {} attempted, {} downloaded, {} failed",
            result.download_attempts(),
            result.downloaded,
            result.download_failed
        ),
        format!(
            "Background removal: {} attempted, {} succeeded, {} failed",
            result.enrich_attempts(),
            result.enriched,
            result.enrich_failed
        ),
    ]
}

/// Human-readable summary printed after a collection finishes.
pub fn summary(report: &RunReport) -> String {
    let [images, enrich] = phase_lines(&report.result);
    format!(
        "Collection '{}': {} records ({} with image) saved to {}\n  {}\n  {}",
        report.collection,
        report.total_records,
        report.records_with_image,
        report.table_path.display(),
        images,
        enrich
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn summary_lists_both_phases() {
        let report = RunReport {
            collection: "mugs".to_string(),
            table_path: PathBuf::from("out/mugs/mugs_products.csv"),
            total_records: 4,
            records_with_image: 3,
            result: RunResult {
                downloaded: 2,
                download_failed: 1,
                enriched: 1,
                enrich_failed: 1,
            },
            outcomes: Vec::new(),
        };

        let text = summary(&report);

        assert!(text.starts_with("Collection 'mugs': 4 records (3 with image)"));
        assert!(text.contains("Images: 3 attempted, 2 downloaded, 1 failed"));
        assert!(text.contains("Background removal: 2 attempted, 1 succeeded, 1 failed"));
    }

    #[test]
    fn empty_run_reports_zeroes() {
        let [images, enrich] = phase_lines(&RunResult::default());
        assert_eq!(images, "Images: 0 attempted, 0 downloaded, 0 failed");
        assert_eq!(enrich, "Background removal: 0 attempted, 0 succeeded, 0 failed");
    }
}
