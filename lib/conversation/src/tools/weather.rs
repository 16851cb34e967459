//! `get_weather`: a simulated weather reading.

use crate::error::ToolError;
use crate::tool::{Tool, ToolDefinition, str_arg};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};

const CONDITIONS: [&str; 4] = ["Sunny", "Cloudy", "Rainy", "Snowy"];

/// A weather reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReading {
    /// Location as given by the model.
    pub location: String,
    /// Temperature in degrees Celsius.
    pub temperature: i32,
    /// Sky condition.
    pub condition: String,
    /// Relative humidity in percent.
    pub humidity: u8,
}

impl WeatherReading {
    fn simulated(location: &str) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            location: location.to_string(),
            temperature: rng.gen_range(-10..30),
            condition: CONDITIONS[rng.gen_range(0..CONDITIONS.len())].to_string(),
            humidity: rng.gen_range(0..100),
        }
    }
}

/// Simulated weather lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("get_weather", "Get current weather information for a location")
            .with_input_schema(json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "The city or location name" }
                },
                "required": ["location"]
            }))
    }

    async fn execute(&self, arguments: Map<String, JsonValue>) -> Result<JsonValue, ToolError> {
        let location = str_arg(&arguments, "location").ok_or_else(|| ToolError::InvalidInput {
            name: "get_weather".to_string(),
            reason: "location is required".to_string(),
        })?;

        serde_json::to_value(WeatherReading::simulated(location)).map_err(|e| {
            ToolError::ExecutionFailed {
                name: "get_weather".to_string(),
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reading_is_within_range() {
        let mut arguments = Map::new();
        arguments.insert("location".to_string(), json!("Hanoi"));

        let reading = WeatherTool.execute(arguments).await.expect("reading");
        assert_eq!(reading["location"], "Hanoi");
        let temperature = reading["temperature"].as_i64().expect("temperature");
        assert!((-10..30).contains(&temperature));
        assert!(CONDITIONS.contains(&reading["condition"].as_str().expect("condition")));
        assert!(reading["humidity"].as_u64().expect("humidity") < 100);
    }

    #[tokio::test]
    async fn missing_location_is_invalid_input() {
        let err = WeatherTool.execute(Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }
}
