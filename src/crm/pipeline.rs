//! Automatic stage assignment for clients that are not in the pipeline yet

use crate::store::models::{Client, Stage};

/// Total spend above which a client counts as high value
pub const VIP_SPEND_THRESHOLD: f64 = 200_000.0;

const VIP_TAG_MARKERS: [&str; 3] = ["vip", "oro", "premium"];

/// Customer tier derived from visit history and tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTier {
    Prospect,
    New,
    Regular,
    Vip,
}

impl StageTier {
    /// Classify a client by visit count; a VIP tag overrides the count
    pub fn for_client(client: &Client) -> Self {
        let tagged_vip = client.tags.iter().any(|tag| {
            let tag = tag.to_lowercase();
            VIP_TAG_MARKERS.iter().any(|m| tag.contains(m))
        });
        if tagged_vip {
            return Self::Vip;
        }

        match client.visit_count {
            i64::MIN..=0 => Self::Prospect,
            1..=3 => Self::New,
            4..=15 => Self::Regular,
            _ => Self::Vip,
        }
    }

    /// Stage names (lowercase) this tier maps to
    fn stage_names(&self) -> &'static [&'static str] {
        match self {
            Self::Prospect => &["prospecto", "prospect"],
            Self::New => &["cliente nuevo", "new customer"],
            Self::Regular => &["cliente regular", "regular customer"],
            Self::Vip => &["cliente vip", "vip customer"],
        }
    }

    /// Position used when no stage carries the tier's name
    fn fallback_position(&self) -> usize {
        match self {
            Self::Prospect => 0,
            Self::New => 1,
            Self::Regular => 2,
            Self::Vip => 3,
        }
    }

    /// Pick the stage for this tier from `stages` (ordered by position):
    /// by name first, then by position, then the first stage.
    pub fn resolve<'a>(&self, stages: &'a [Stage]) -> Option<&'a Stage> {
        let names = self.stage_names();
        stages
            .iter()
            .find(|s| names.contains(&s.name.trim().to_lowercase().as_str()))
            .or_else(|| stages.get(self.fallback_position()))
            .or_else(|| stages.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::DEFAULT_STAGE_COLOR;
    use chrono::Utc;
    use uuid::Uuid;

    fn client(visits: i64, spent: f64, tags: &[&str]) -> Client {
        let mut c = Client::new("Test".into());
        c.visit_count = visits;
        c.total_spent = spent;
        c.tags = tags.iter().map(|t| t.to_string()).collect();
        c
    }

    fn stages(names: &[&str]) -> Vec<Stage> {
        let now = Utc::now();
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Stage {
                id: Uuid::new_v4(),
                name: n.to_string(),
                description: None,
                color: DEFAULT_STAGE_COLOR.into(),
                order: i as i64,
                is_default: false,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    #[test]
    fn test_tier_by_visits() {
        assert_eq!(StageTier::for_client(&client(0, 0.0, &[])), StageTier::Prospect);
        assert_eq!(StageTier::for_client(&client(1, 0.0, &[])), StageTier::New);
        assert_eq!(StageTier::for_client(&client(3, 0.0, &[])), StageTier::New);
        assert_eq!(StageTier::for_client(&client(4, 0.0, &[])), StageTier::Regular);
        assert_eq!(StageTier::for_client(&client(15, 0.0, &[])), StageTier::Regular);
        assert_eq!(StageTier::for_client(&client(16, 0.0, &[])), StageTier::Vip);
    }

    #[test]
    fn test_high_spend_keeps_visit_tier() {
        assert_eq!(
            StageTier::for_client(&client(2, 250_000.0, &[])),
            StageTier::New
        );
        assert_eq!(
            StageTier::for_client(&client(10, 900_000.0, &[])),
            StageTier::Regular
        );
        assert_eq!(
            StageTier::for_client(&client(20, 0.0, &[])),
            StageTier::Vip
        );
    }

    #[test]
    fn test_tags_promote_to_vip() {
        assert_eq!(
            StageTier::for_client(&client(2, 0.0, &["gold"])),
            StageTier::New
        );
        assert_eq!(
            StageTier::for_client(&client(0, 0.0, &["Cliente ORO"])),
            StageTier::Vip
        );
        assert_eq!(
            StageTier::for_client(&client(1, 0.0, &["premium"])),
            StageTier::Vip
        );
    }

    #[test]
    fn test_resolve_by_name_then_position() {
        let named = stages(&["Cliente VIP", "Prospecto", "Cliente Nuevo"]);
        assert_eq!(StageTier::Vip.resolve(&named).unwrap().name, "Cliente VIP");
        assert_eq!(StageTier::Prospect.resolve(&named).unwrap().name, "Prospecto");
        // No "regular" stage: position 2
        assert_eq!(StageTier::Regular.resolve(&named).unwrap().name, "Cliente Nuevo");

        let generic = stages(&["A", "B"]);
        assert_eq!(StageTier::New.resolve(&generic).unwrap().name, "B");
        // Position 3 does not exist: first stage
        assert_eq!(StageTier::Vip.resolve(&generic).unwrap().name, "A");
        assert!(StageTier::Vip.resolve(&[]).is_none());
    }
}
