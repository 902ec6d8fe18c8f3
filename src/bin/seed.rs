use argon2::{
    Argon2, PasswordHasher,
    password_hash::{rand_core::OsRng, SaltString},
};
use chrono::Utc;
use fitgear_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{products, users},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user_with_role(&orm, "admin@fitgear.test", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&orm, "user@fitgear.test", "user123", "user").await?;
    seed_products(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already present (role={})", existing.role);
        return Ok(existing.id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        role: Set(role.to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user.id)
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let catalog: [(&str, &str, Decimal, i32); 6] = [
        (
            "Adjustable Dumbbell 24kg",
            "Dial-select plates from 2.5 to 24 kg",
            dec!(329.00),
            40,
        ),
        (
            "Olympic Barbell 20kg",
            "Needle-bearing sleeves, 190k PSI shaft",
            dec!(289.00),
            25,
        ),
        (
            "Competition Kettlebell 16kg",
            "Steel shell, colour-coded handle",
            dec!(94.50),
            60,
        ),
        (
            "Resistance Band Set",
            "Five latex loops, 5 to 50 lb",
            dec!(28.90),
            200,
        ),
        (
            "Foam Roller",
            "High-density EPP, 45 cm",
            dec!(24.00),
            150,
        ),
        (
            "Flat Utility Bench",
            "1,000 lb rated, grippy vinyl pad",
            dec!(159.00),
            18,
        ),
    ];

    for (name, desc, price, stock) in catalog {
        let exists = products::Entity::find()
            .filter(products::Column::Name.eq(name))
            .one(orm)
            .await?;
        if exists.is_some() {
            continue;
        }
        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(desc.to_string())),
            price: Set(price),
            stock: Set(stock),
            active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
