use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::error::Error;

#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db = client.database(&database_name_from_uri(uri));

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { db };

        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates the indexes the borrow/membership logic relies on (uniqueness included).
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        log::info!("🔧 Creating database indexes...");

        let unique = || IndexOptions::builder().unique(true).build();

        let specs: Vec<(&str, Document, Option<IndexOptions>)> = vec![
            ("users", doc! { "email": 1 }, Some(unique())),
            ("users", doc! { "username": 1 }, Some(unique())),
            (
                "books",
                doc! { "isbn": 1 },
                Some(IndexOptions::builder().unique(true).sparse(true).build()),
            ),
            ("books", doc! { "title": 1, "author": 1 }, None),
            ("borrows", doc! { "student": 1, "status": 1 }, None),
            ("borrows", doc! { "status": 1, "due_date": 1 }, None),
            ("memberships", doc! { "user": 1 }, Some(unique())),
            ("memberships", doc! { "verification_token": 1 }, None),
            ("favorites", doc! { "user": 1, "book": 1 }, Some(unique())),
            ("payments", doc! { "student": 1 }, None),
        ];

        for (collection, keys, options) in specs {
            let description = format!("{}({})", collection, keys.keys().cloned().collect::<Vec<_>>().join(", "));
            let index = IndexModel::builder().keys(keys).options(options).build();

            match self.collection::<Document>(collection).create_index(index).await {
                Ok(_) => log::info!("   ✅ Index ready: {}", description),
                Err(e) => log::warn!("   ⚠️  Index {} not created: {}", description, e),
            }
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub async fn ping(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }
}

/// Database name from the URI path, falling back to `library`.
fn database_name_from_uri(uri: &str) -> String {
    let without_scheme = uri.split("://").nth(1).unwrap_or(uri);
    without_scheme
        .split_once('/')
        .map(|(_, rest)| rest.split('?').next().unwrap_or(""))
        .filter(|name| !name.is_empty())
        .unwrap_or("library")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_from_uri() {
        assert_eq!(database_name_from_uri("mongodb://localhost:27017/astu_library"), "astu_library");
        assert_eq!(
            database_name_from_uri("mongodb+srv://u:p@cluster.example.net/books?retryWrites=true"),
            "books"
        );
        assert_eq!(database_name_from_uri("mongodb://localhost:27017"), "library");
        assert_eq!(database_name_from_uri("mongodb://localhost:27017/?w=majority"), "library");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_mongodb_connection() {
        dotenv::dotenv().ok();
        let uri = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017/library_test".to_string());

        let db = MongoDB::new(&uri).await;
        assert!(db.is_ok());
        assert!(db.unwrap().ping().await);
    }
}
