use async_trait::async_trait;
use classbook_core::repository::SnapshotRepository;
use classbook_core::CoreResult;
use classbook_shared::EnhancedBooking;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes the booking list as JSON to a local file
pub struct FileSnapshotRepository {
    path: PathBuf,
}

impl FileSnapshotRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotRepository for FileSnapshotRepository {
    async fn save(&self, bookings: &[EnhancedBooking]) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(bookings)?;

        // Write beside the target then rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved {} bookings to {}", bookings.len(), self.path.display());
        Ok(())
    }

    async fn load(&self) -> CoreResult<Vec<EnhancedBooking>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No booking snapshot at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let bookings: Vec<EnhancedBooking> = serde_json::from_slice(&bytes)?;
        info!("Restored {} bookings from {}", bookings.len(), self.path.display());
        Ok(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use classbook_shared::{Booking, ClassSnapshot};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("classbook-test-{}", Uuid::new_v4().simple()))
            .join("bookings.json")
    }

    fn enhanced() -> EnhancedBooking {
        let class_id = Uuid::new_v4();
        let booking = Booking::new(class_id, "parent-7", Utc::now() + Duration::days(3), 1)
            .unwrap()
            .with_special_requirements("Asthma inhaler in bag");
        let class = ClassSnapshot {
            class_id,
            name: "Mini Chefs".to_string(),
            provider_id: "provider-3".to_string(),
            provider_name: "Kitchen Club".to_string(),
            location: "Community Kitchen".to_string(),
            price: dec!(9.50),
            currency: "GBP".to_string(),
        };
        EnhancedBooking::new(booking, class).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let repo = FileSnapshotRepository::new(temp_path());
        assert!(repo.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let repo = FileSnapshotRepository::new(temp_path());
        let booking = enhanced();

        repo.save(&[booking.clone()]).await.unwrap();
        let restored = repo.load().await.unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].id(), booking.id());
        assert_eq!(restored[0].class.price, dec!(9.50));
        assert_eq!(
            restored[0].booking.special_requirements.as_ref().map(|r| r.expose().as_str()),
            Some("Asthma inhaler in bag")
        );

        let _ = tokio::fs::remove_dir_all(repo.path().parent().unwrap()).await;
    }
}
