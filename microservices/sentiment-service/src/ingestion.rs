//! Writes upstream samples into the raw series

use lit_core::Sample;
use lit_tsdb::SeriesEntry;
use tracing::{debug, info};

use crate::error::Result;
use crate::keys::{KeySpace, PRICE, RAW, SENTIMENT};
use crate::store::StoreClient;

#[derive(Clone)]
pub struct Ingestion {
    store: StoreClient,
    price_key: String,
    sentiment_key: String,
}

impl Ingestion {
    pub fn new(store: StoreClient, keys: &KeySpace) -> Self {
        Self {
            store,
            price_key: keys.series_key(PRICE, RAW),
            sentiment_key: keys.series_key(SENTIMENT, RAW),
        }
    }

    /// Persist a batch with a single write. Samples whose timestamp is already
    /// stored keep their first value, so replaying a batch changes nothing.
    pub async fn persist(&self, samples: &[Sample]) -> Result<usize> {
        if samples.is_empty() {
            debug!("No samples to persist");
            return Ok(0);
        }

        let entries = self.entries(samples);
        let written = self.store.append_many(&entries).await?;
        info!(samples = samples.len(), entries = written, "Persisted samples");
        Ok(samples.len())
    }

    fn entries(&self, samples: &[Sample]) -> Vec<SeriesEntry> {
        let mut entries = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            let ts = sample.timestamp_ms();
            entries.push(SeriesEntry::new(&self.price_key, ts, sample.price));
            entries.push(SeriesEntry::new(
                &self.sentiment_key,
                ts,
                sample.sentiment_mean,
            ));
        }
        entries
    }
}
