use tracing::{info, warn};

use crate::auth::Credential;
use crate::error::AppError;
use crate::models::{Coach, Material, Request, School, User};
use crate::storage::{Collection, JsonStore};

pub fn default_users() -> Vec<User> {
    vec![User {
        ps_number: "admin".to_string(),
        password: "admin".to_string(),
        credential: Credential::Admin,
        name: "Administrator".to_string(),
    }]
}

pub fn default_materials() -> Vec<Material> {
    [
        ("Sports Equipment", "Balls", "Football"),
        ("Sports Equipment", "Balls", "Volleyball"),
        ("Sports Equipment", "Mats", "Training Mat"),
        ("Uniforms", "Kimono", "Kimono A1"),
        ("Uniforms", "Kimono", "Kimono A2"),
        ("Uniforms", "Belts", "White Belt"),
        ("Stationery", "Paper", "A4 Ream"),
    ]
    .into_iter()
    .map(|(category, subcategory, item)| Material {
        category: category.to_string(),
        subcategory: subcategory.to_string(),
        item: item.to_string(),
    })
    .collect()
}

/// Creates any missing collection file with its starting contents.
pub async fn seed_defaults(store: &JsonStore) -> Result<(), AppError> {
    if store.ensure(Collection::Users, &default_users()).await? {
        warn!("Seeded default admin account with a plaintext password; change it in users.json");
    }
    store.ensure::<Coach>(Collection::Coaches, &[]).await?;
    store.ensure::<School>(Collection::Schools, &[]).await?;
    store
        .ensure(Collection::Materials, &default_materials())
        .await?;
    store.ensure::<Request>(Collection::Requests, &[]).await?;

    info!(data_dir = %store.dir().display(), "Data directory ready");
    Ok(())
}
