//! Default sales funnel created for a new business

use crate::store::models::Stage;
use chrono::Utc;
use uuid::Uuid;

/// (name, description, color)
const DEFAULT_STAGES: [(&str, &str, &str); 5] = [
    ("Prospecto", "Cliente potencial identificado", "#3B82F6"),
    ("Contactado", "Primer contacto realizado", "#EAB308"),
    ("Interesado", "Muestra interés en el producto o servicio", "#F97316"),
    ("Negociando", "En proceso de negociación", "#8B5CF6"),
    ("Cliente", "Conversión exitosa", "#22C55E"),
];

/// The five default stages, ordered 1..=5 and protected from deletion
pub fn default_stages() -> Vec<Stage> {
    let now = Utc::now();
    DEFAULT_STAGES
        .iter()
        .enumerate()
        .map(|(i, (name, description, color))| Stage {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: Some(description.to_string()),
            color: color.to_string(),
            order: i as i64 + 1,
            is_default: true,
            created_at: now,
            updated_at: now,
        })
        .collect()
}
