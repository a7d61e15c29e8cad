use console::Style;
use correl_core::mesh::GlobalCorrelationResult;
use correl_core::register::RegistrationResult;
use correl_core::search::PixelSearchResult;
use correl_core::transform::decompose;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    good: Style,
    bad: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            good: Style::new().green(),
            bad: Style::new().yellow(),
        }
    }
}

fn triple(v: &[f64]) -> String {
    format!("{:>10.4} {:>10.4} {:>10.4}", v[0], v[1], v[2])
}

pub fn print_registration_summary(result: &RegistrationResult) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Registration"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(12)));
    println!();

    let status = format!("{} ({})", result.status, result.status.code());
    let status_style = if result.status.is_converged() {
        &s.good
    } else {
        &s.bad
    };
    println!(
        "  {:<14}{}",
        s.label.apply_to("Status"),
        status_style.apply_to(status)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Iterations"),
        s.value.apply_to(result.iterations)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Error"),
        s.value.apply_to(format!("{:.6e}", result.error))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("|dPhi|"),
        s.value.apply_to(format!("{:.6e}", result.delta_phi_norm))
    );
    println!();

    let d = decompose(&result.phi, result.phi_centre, result.phi_centre);
    println!("  {}", s.header.apply_to("Decomposition (z, y, x)"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Centre"),
        s.value.apply_to(triple(&result.phi_centre))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Translation"),
        s.value.apply_to(triple(d.translation.as_slice()))
    );
    println!(
        "    {:<12}{}  ({:.4} deg)",
        s.label.apply_to("Rotation"),
        s.value.apply_to(triple(d.rotation.as_slice())),
        d.rotation_angle()
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Zoom"),
        s.value.apply_to(triple(d.zoom.as_slice()))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Shear"),
        s.value.apply_to(triple(d.shear.as_slice()))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Volume"),
        s.value.apply_to(format!("{:.6}", d.volumetric_change))
    );
    println!();

    println!("  {}", s.header.apply_to("Phi"));
    for row in 0..4 {
        let m = &result.phi.0;
        println!(
            "    {:>10.6} {:>10.6} {:>10.6} {:>10.4}",
            m[(row, 0)],
            m[(row, 1)],
            m[(row, 2)],
            m[(row, 3)]
        );
    }
    println!();
}

pub fn print_pixel_search_summary(result: &PixelSearchResult) {
    let s = Styles::new();
    let [z, y, x] = result.translation;

    println!();
    println!("  {}", s.title.apply_to("Pixel Search"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(12)));
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Translation"),
        s.value.apply_to(format!("{} {} {}", z, y, x))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Score"),
        s.value.apply_to(format!("{:.6}", result.score))
    );
    if result.base_offset.iter().any(|&o| o != 0.0) {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Base offset"),
            s.value.apply_to(triple(&result.base_offset))
        );
    }
    println!();
}

pub fn print_global_summary(result: &GlobalCorrelationResult) {
    let s = Styles::new();
    let status = if result.converged {
        s.good.apply_to("Converged")
    } else {
        s.bad.apply_to("Not converged")
    };

    println!();
    println!("  {}", s.title.apply_to("Global Correlation"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(18)));
    println!();
    println!("  {:<14}{}", s.label.apply_to("Status"), status);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Iterations"),
        s.value.apply_to(result.iterations)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Error"),
        s.value.apply_to(format!("{:.6e}", result.error))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("|du|"),
        s.value.apply_to(format!("{:.6e}", result.delta_norm))
    );

    let max = result
        .displacements
        .rows()
        .into_iter()
        .map(|u| (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt())
        .fold(0.0f64, f64::max);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Max |u|"),
        s.value.apply_to(format!("{:.4} px", max))
    );
    println!();
}
