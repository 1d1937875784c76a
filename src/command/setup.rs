use anyhow::Result;
use console::style;

use crate::sandbox::Provision;
use crate::spinner;

/// Build the image, provision the sandbox, install plugins and open the
/// network to the project's hosts.
pub fn run(rebuild: bool) -> Result<()> {
    let manager = super::load_manager()?;
    let name = manager.identity();

    spinner::with_streaming_output("Building image", |sink| manager.build_image(sink))?;

    if rebuild {
        spinner::with_spinner(&format!("Recreating sandbox {name}"), || {
            Ok(manager.recreate()?)
        })?;
    } else {
        let provision =
            spinner::with_spinner(&format!("Provisioning sandbox {name}"), || {
                match manager.ensure_exists() {
                    // Another turbo process created it between our listing and create.
                    Err(e) if e.is_conflict() => Ok(Provision::Existing),
                    other => Ok(other?),
                }
            })?;
        if provision == Provision::Existing {
            println!("Sandbox {name} already exists. Use --rebuild to start fresh.");
        }
    }

    super::install_plugins(&manager)?;
    super::prepare::prepare(&manager)?;

    println!();
    println!("{} Sandbox ready. Run {} to start.", style("✓").green(), style("turbo claude").bold());
    Ok(())
}
