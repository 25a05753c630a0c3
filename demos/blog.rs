//! Blog workflow example.
//!
//! Migrates a small schema, defines `User` and `Post` record types, then
//! walks through creating, querying, eager loading and updating records.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run -p recordkit-demos --example blog
//! ```

use recordkit_core::{
    AssociationOptions, FieldDef, Lifecycle, ModelRegistry, RecordType, Repo, ValidationRules,
    Value, row,
};
use recordkit_sqlite::{FnMigration, MigrationEngine, SqliteDatabase, TableBuilder};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // === Step 1: Migrate ===
    println!("=== Migration ===");
    let db = SqliteDatabase::open_in_memory().unwrap();
    let mut engine = MigrationEngine::new(&db, "schema_migrations").unwrap();
    engine
        .register(FnMigration::new(
            "001",
            "create_users",
            |ops| {
                ops.create_table(
                    "users",
                    TableBuilder::new()
                        .id()
                        .field(FieldDef::text("email").not_null().unique())
                        .text("name")
                        .timestamps(),
                )
            },
            |ops| ops.drop_table("users"),
        ))
        .unwrap();
    engine
        .register(FnMigration::new(
            "002",
            "create_posts",
            |ops| {
                ops.create_table(
                    "posts",
                    TableBuilder::new()
                        .id()
                        .integer("user_id")
                        .text("title")
                        .boolean("published")
                        .foreign_key("user_id", "users", "id"),
                )?;
                ops.add_index("posts", &["user_id"], false).map(drop)
            },
            |ops| ops.drop_table("posts"),
        ))
        .unwrap();
    for version in engine.migrate().unwrap() {
        println!("applied {version}");
    }

    // === Step 2: Define record types ===
    let mut registry = ModelRegistry::new();
    registry
        .define(
            RecordType::new("User")
                .timestamps()
                .validates("email", ValidationRules::new().required().email().unique())
                .validates("name", ValidationRules::new().max_length(40))
                .has_many("posts", AssociationOptions::new())
                .on(Lifecycle::BeforeSave, |user| {
                    if let Some(email) = user.get("email").as_str() {
                        let lowered = email.to_lowercase();
                        user.set("email", lowered);
                    }
                }),
        )
        .unwrap();
    registry
        .define(
            RecordType::new("Post")
                .validates("title", ValidationRules::new().required())
                .belongs_to("author", AssociationOptions::new().target("User").foreign_key("user_id")),
        )
        .unwrap();
    let repo = Repo::new(&db, &registry);
    let users = repo.model("User").unwrap();
    let posts = repo.model("Post").unwrap();

    // === Step 3: Create ===
    println!("\n=== Records ===");
    let mut ada = users
        .create(row! { "email" => "Ada@Example.com", "name" => "Ada" })
        .unwrap();
    println!("created: {}", serde_json::to_string(&ada.to_json()).unwrap());

    let rejected = users.create(row! { "email" => "ada@example.com" }).unwrap();
    println!("duplicate rejected: {:?}", rejected.errors());

    users
        .insert_all(&[
            row! { "email" => "grace@example.com", "name" => "Grace" },
            row! { "email" => "alan@example.com", "name" => "Alan" },
        ])
        .unwrap();

    let mut ada_posts = repo.has_many(&mut ada, "posts").unwrap();
    ada_posts
        .create(row! { "title" => "Notes on the Analytical Engine", "published" => true })
        .unwrap();
    ada_posts.create(row! { "title" => "Draft", "published" => false }).unwrap();
    println!("ada has {} post(s)", ada_posts.count().unwrap());

    // === Step 4: Query ===
    println!("\n=== Queries ===");
    let published = posts.where_eq("published", true).count().unwrap();
    println!("published posts: {published}");

    let names = users.query().order("name").pluck("name").unwrap();
    println!("users by name: {names:?}");

    db.reset_statement_count();
    let with_posts = users.includes(["posts"]).all().unwrap();
    for user in &with_posts {
        let count = user.association("posts").map_or(0, |p| p.as_many().len());
        println!("  {} -> {count} post(s)", user.get("name"));
    }
    println!("eager load used {} statement(s)", db.statement_count());

    let mut draft = posts.find_by(row! { "title" => "Draft" }).unwrap().unwrap();
    let author = repo.belongs_to(&mut draft, "author").unwrap();
    println!("draft author: {:?}", author.map(|a| a.get("name").clone()));

    // === Step 5: Update and destroy ===
    println!("\n=== Changes ===");
    ada.set("name", "Ada Lovelace");
    println!("changed: {:?}", ada.changes().keys().collect::<Vec<_>>());
    repo.save(&mut ada).unwrap();

    repo.destroy(&mut draft).unwrap();
    println!("draft state after destroy: {:?}", draft.state());
    println!(
        "remaining posts: {:?}",
        posts.query().pluck("title").unwrap_or_default()
    );
    println!(
        "ada reloaded: {}",
        users.find(ada.id().clone()).unwrap().map_or(Value::Null, |u| u.get("name").clone())
    );
}
