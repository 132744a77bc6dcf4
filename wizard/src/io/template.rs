//! Rendering of the network stack template.

use minijinja::{Environment, context};
use thiserror::Error;

const VPC_TEMPLATE: &str = include_str!("templates/vpc.yml.j2");

pub const MAX_AVAILABILITY_ZONES: u8 = 3;
pub const DEFAULT_AVAILABILITY_ZONES: u8 = 2;

/// Numeric inputs of the network template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTemplateParams {
    /// Availability zones to spread subnets across (1 to 3).
    pub az_count: u8,
    /// `n` in the `10.n.0.0/16` address block.
    pub second_octet: u8,
}

impl Default for NetworkTemplateParams {
    fn default() -> Self {
        Self {
            az_count: DEFAULT_AVAILABILITY_ZONES,
            second_octet: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("availability zone count must be between 1 and {MAX_AVAILABILITY_ZONES}, got {0}")]
    InvalidZoneCount(u8),
    #[error(transparent)]
    Render(#[from] minijinja::Error),
}

pub trait TemplateRenderer {
    /// Render the network stack document; the result is passed through uninterpreted.
    fn render_network(&self, params: &NetworkTemplateParams) -> Result<String, TemplateError>;
}

/// Template engine wrapper around minijinja.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
}

impl MiniJinjaRenderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.add_template("vpc", VPC_TEMPLATE)?;
        Ok(Self { env })
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render_network(&self, params: &NetworkTemplateParams) -> Result<String, TemplateError> {
        if !(1..=MAX_AVAILABILITY_ZONES).contains(&params.az_count) {
            return Err(TemplateError::InvalidZoneCount(params.az_count));
        }
        let template = self.env.get_template("vpc")?;
        let rendered = template.render(context! {
            az_count => params.az_count,
            second_octet => params.second_octet,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(az_count: u8, second_octet: u8) -> String {
        MiniJinjaRenderer::new()
            .expect("renderer")
            .render_network(&NetworkTemplateParams {
                az_count,
                second_octet,
            })
            .expect("render")
    }

    #[test]
    fn renders_one_subnet_pair_per_zone() {
        let rendered = render(3, 7);
        assert!(rendered.contains("CidrBlock: '10.7.0.0/16'"));
        assert!(rendered.contains("SubnetPrivate2:"));
        assert!(!rendered.contains("SubnetPrivate3:"));
        assert!(rendered.contains("'10.7.96.0/20'"));
        assert!(rendered.contains(
            "!Join [',', [!Ref SubnetPrivate0, !Ref SubnetPrivate1, !Ref SubnetPrivate2]]"
        ));
    }

    #[test]
    fn declares_required_outputs() {
        let rendered = render(1, 0);
        for output in ["  VPC:\n    Description", "  SubnetsPrivate:", "  DefaultTaskSecurityGroup:\n    Description"] {
            assert!(rendered.contains(output), "missing {output}");
        }
        assert!(rendered.contains("!Join [',', [!Ref SubnetPrivate0]]"));
    }

    #[test]
    fn rejects_out_of_range_zone_counts() {
        let renderer = MiniJinjaRenderer::new().expect("renderer");
        for az_count in [0, 4] {
            let err = renderer
                .render_network(&NetworkTemplateParams {
                    az_count,
                    second_octet: 0,
                })
                .unwrap_err();
            assert!(matches!(err, TemplateError::InvalidZoneCount(n) if n == az_count));
        }
    }
}
