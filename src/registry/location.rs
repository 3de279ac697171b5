//! Parsing of in-world location and position strings.
//!
//! Locations look like `"Region Name (128, 64, 22)"`; only the region part
//! before the parenthesis is kept. Positions look like `"(128.5, 64, 22.25)"`.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location {0:?} has no '(' after the region name")]
    MissingParenthesis(String),
    #[error("location {0:?} has an empty region name")]
    EmptyRegion(String),
    #[error("position {0:?} is not wrapped in parentheses")]
    UnwrappedPosition(String),
    #[error("position {input:?} has {found} components, expected 3")]
    ComponentCount { input: String, found: usize },
    #[error("position component {0:?} is not a number")]
    InvalidComponent(String),
}

/// In-region coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Extract the region name from a location string
pub fn parse_region(location: &str) -> Result<String, LocationError> {
    let Some(open) = location.find('(') else {
        return Err(LocationError::MissingParenthesis(location.to_string()));
    };

    let region = location[..open].trim();
    if region.is_empty() {
        return Err(LocationError::EmptyRegion(location.to_string()));
    }

    Ok(region.to_string())
}

/// Parse `"(x, y, z)"` into numeric coordinates
pub fn parse_position(position: &str) -> Result<Position, LocationError> {
    let inner = position
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| LocationError::UnwrappedPosition(position.to_string()))?;

    let components: Vec<&str> = inner.split(',').map(str::trim).collect();
    if components.len() != 3 {
        return Err(LocationError::ComponentCount {
            input: position.to_string(),
            found: components.len(),
        });
    }

    let mut xyz = [0.0; 3];
    for (slot, component) in xyz.iter_mut().zip(&components) {
        *slot = component
            .parse::<f64>()
            .map_err(|_| LocationError::InvalidComponent(component.to_string()))?;
    }

    Ok(Position {
        x: xyz[0],
        y: xyz[1],
        z: xyz[2],
    })
}
