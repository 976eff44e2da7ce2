use tracing::info;

use crate::core::{AbstractActivityHandler, ActivityError};

pub struct GreetingActivity;

#[async_trait::async_trait]
impl AbstractActivityHandler for GreetingActivity {
    async fn run(&self, name: String) -> Result<String, ActivityError> {
        info!(name = %name, "Activity");
        Ok(format!("Hello {name}!"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn greets_by_name() {
        assert_eq!(
            GreetingActivity.run("World".to_string()).await.unwrap(),
            "Hello World!"
        );
    }

    #[tokio::test]
    async fn output_is_plain_concatenation() {
        for name in ["", "Temporal", "  spaced  ", "ünïcødé", "Hello World!"] {
            let greeting = GreetingActivity.run(name.to_string()).await.unwrap();
            assert_eq!(greeting, "Hello ".to_string() + name + "!");
        }
    }
}
