pub mod config {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct Config {
        pub db_url: String,
        #[serde(default = "default_port")]
        pub port: u16,
        /// Origin allowed to call the JSON API from a browser, e.g. `http://localhost:4200`.
        #[serde(default)]
        pub cors_allowed_origin: Option<String>,
        /// Inserts the welcome todos on startup when the table is empty.
        #[serde(default)]
        pub seed_welcome_todos: bool,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default().try_parsing(true))
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }
    }

    fn default_port() -> u16 {
        8080
    }
}
pub mod clock;
pub mod entities;
pub mod todo;
pub mod web;
