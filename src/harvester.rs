use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Local;
use reqwest::Client;
use tracing::info;

use crate::config::{HarvestConfig, NamingScheme};
use crate::download::{FixedDelay, HttpDownloader, ImageDownloader, NoDelay, Pacing};
use crate::enrich::{BackgroundRemover, ReplicateRemover};
use crate::error::HarvestError;
use crate::models::{Collection, ItemOutcome, ProductRecord, RunReport, RunResult};
use crate::report;
use crate::traits::SourceAdapter;
use crate::writer::write_table;

pub const IMAGES_DIR: &str = "images";
pub const PROCESSED_DIR: &str = "no_bg_images";

/// Runs the fetch → extract → write → download → enrich pipeline for one source
pub struct Harvester {
    source: Box<dyn SourceAdapter>,
    config: HarvestConfig,
    downloader: Option<Box<dyn ImageDownloader>>,
    remover: Option<Box<dyn BackgroundRemover>>,
    pacing: Box<dyn Pacing>,
}

impl Harvester {
    /// Bare driver: writes the table only until a downloader is attached.
    pub fn new(source: Box<dyn SourceAdapter>, config: HarvestConfig) -> Self {
        let pacing: Box<dyn Pacing> = if config.download_delay.is_zero() {
            Box::new(NoDelay)
        } else {
            Box::new(FixedDelay(config.download_delay))
        };
        Self {
            source,
            config,
            downloader: None,
            remover: None,
            pacing,
        }
    }

    /// Wire the HTTP downloader and the hosted remover as `config` asks.
    pub fn from_config(
        source: Box<dyn SourceAdapter>,
        config: HarvestConfig,
        client: Client,
    ) -> Result<Self, HarvestError> {
        let mut harvester = Self::new(source, config);

        if harvester.config.download_images {
            let base_url = harvester.source.config().base_url.clone();
            let downloader = HttpDownloader::new(client.clone(), &base_url)
                .map_err(|e| HarvestError::InvalidConfig(e.to_string()))?;
            harvester = harvester.with_downloader(Box::new(downloader));

            if let Some(settings) = harvester.config.enrich.clone() {
                harvester = harvester.with_remover(Box::new(ReplicateRemover::new(client, settings)));
            }
        }

        Ok(harvester)
    }

    pub fn with_downloader(mut self, downloader: Box<dyn ImageDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_remover(mut self, remover: Box<dyn BackgroundRemover>) -> Self {
        self.remover = Some(remover);
        self
    }

    pub fn with_pacing(mut self, pacing: Box<dyn Pacing>) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn harvest(&mut self, collection: &Collection) -> Result<RunReport, HarvestError> {
        info!(
            "Harvesting '{}' from {}",
            collection.identifier,
            self.source.config().name
        );

        let raw = self.source.fetch(collection).await?;
        let records = self.source.extract(&raw);
        info!("Extracted {} records", records.len());

        let collection_dir = self.config.output_dir.join(&collection.name);
        create_dir(&collection_dir)?;

        let table_path = self.table_path(collection, &collection_dir);
        write_table(&records, &table_path, self.config.format)?;

        let records_with_image = records.iter().filter(|r| has_image(r)).count();
        let mut result = RunResult::default();
        let mut outcomes = Vec::new();

        if self.downloader.is_some() {
            let images_dir = collection_dir.join(IMAGES_DIR);
            create_dir(&images_dir)?;
            let processed_dir = collection_dir.join(PROCESSED_DIR);
            if self.remover.is_some() {
                create_dir(&processed_dir)?;
            }

            let mut taken = HashSet::new();
            for record in &records {
                let outcome = self
                    .process_record(record, &images_dir, &processed_dir, &mut taken)
                    .await;
                report::log_outcome(record.id, &outcome);
                result.record(&outcome);
                outcomes.push((record.id, outcome));
            }
        } else {
            info!("Image downloads disabled");
        }

        Ok(RunReport {
            collection: collection.name.clone(),
            table_path,
            total_records: records.len(),
            records_with_image,
            result,
            outcomes,
        })
    }

    async fn process_record(
        &mut self,
        record: &ProductRecord,
        images_dir: &Path,
        processed_dir: &Path,
        taken: &mut HashSet<String>,
    ) -> ItemOutcome {
        let (Some(image_url), Some(downloader)) = (
            record.image_url.as_deref().filter(|u| !u.trim().is_empty()),
            self.downloader.as_ref(),
        ) else {
            return ItemOutcome::NoImage;
        };

        let (original_name, processed_name) = file_names(record, self.config.naming, taken);
        let original = images_dir.join(original_name);

        let downloaded = downloader.download(image_url, &original).await;
        tokio::time::sleep(self.pacing.next_delay()).await;

        if let Err(error) = downloaded {
            return ItemOutcome::DownloadFailed(error);
        }

        let Some(remover) = self.remover.as_ref() else {
            return ItemOutcome::Downloaded { original };
        };

        let processed = processed_dir.join(processed_name);
        match remover.remove_background(&original, &processed).await {
            Ok(()) => ItemOutcome::Enriched { original, processed },
            Err(error) => ItemOutcome::EnrichFailed { original, error },
        }
    }

    fn table_path(&self, collection: &Collection, dir: &Path) -> PathBuf {
        let stem = if self.config.timestamped {
            format!("{}_{}", collection.name, Local::now().format("%Y%m%d_%H%M%S"))
        } else {
            format!("{}_products", collection.name)
        };
        dir.join(format!("{stem}.{}", self.config.format.extension()))
    }
}

fn has_image(record: &ProductRecord) -> bool {
    record
        .image_url
        .as_deref()
        .is_some_and(|u| !u.trim().is_empty())
}

fn create_dir(path: &Path) -> Result<(), HarvestError> {
    std::fs::create_dir_all(path).map_err(|e| HarvestError::OutputWriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Title reduced to alphanumerics, spaces, `-` and `_`, right-trimmed.
pub fn safe_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Original and processed file names for a record.
///
/// `taken` holds the stems already handed out in this run; a repeated title
/// gets `_<id>` appended so no record overwrites another's files.
pub fn file_names(
    record: &ProductRecord,
    naming: NamingScheme,
    taken: &mut HashSet<String>,
) -> (String, String) {
    match naming {
        NamingScheme::SequentialId => {
            taken.insert(record.id.to_string());
            (
                format!("{}.jpg", record.id),
                format!("no_bg_{}.png", record.id),
            )
        }
        NamingScheme::SanitizedTitle => {
            let safe = safe_title(&record.title);
            let mut stem = if safe.trim().is_empty() {
                record.id.to_string()
            } else {
                safe
            };
            while taken.contains(&stem) {
                stem = format!("{stem}_{}", record.id);
            }
            taken.insert(stem.clone());
            (format!("{stem}.jpg"), format!("{stem}.png"))
        }
    }
}
