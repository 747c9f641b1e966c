//! A typical acquisition: calibration beads measured on a forward and a side
//! scatter detector, on top of a dense background of small vesicles.
use anyhow::Result;
use cytosim::coupling::{GaussianBeam, RayleighCoupling};
use cytosim::cytometer::FlowCytometer;
use cytosim::detector::{Detector, TransimpedanceAmplifier};
use cytosim::digitizer::{BitDepth, Digitizer};
use cytosim::distribution::Distribution;
use cytosim::filter::{AnalogFilter, Band, FilterKind};
use cytosim::flow_cell::FlowCell;
use cytosim::peak::ThresholdPeakLocator;
use cytosim::population::{ParticleCount, Population, SamplingMethod};
use cytosim::report::{event_summary, peak_summary};
use cytosim::settings::SimulationSettings;
use cytosim::trigger::{Threshold, TriggerScheme, TriggeringSystem};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uom::si::angle::degree;
use uom::si::electric_current::nanoampere;
use uom::si::electrical_resistance::ohm;
use uom::si::f64::{
    Angle, ElectricCurrent, ElectricalResistance, Frequency, Length, Power, Time, VolumeRate,
};
use uom::si::frequency::megahertz;
use uom::si::length::{micrometer, nanometer};
use uom::si::power::{microwatt, milliwatt};
use uom::si::time::millisecond;
use uom::si::volume_rate::cubic_meter_per_second;

fn main() -> Result<()> {
    env_logger::init();

    // ===========================================
    // These are most likely your free parameters:
    let run_time = Time::new::<millisecond>(10.0);
    let seed = 42;
    // ===========================================

    // ===========================================
    // Optical bench and fluidics:
    let beam = GaussianBeam::builder()
        .wavelength(Length::new::<nanometer>(488.0))
        .optical_power(Power::new::<milliwatt>(100.0))
        .numerical_aperture(0.05)
        .build()?;
    let flow_cell = FlowCell::builder()
        .width(Length::new::<micrometer>(20.0))
        .height(Length::new::<micrometer>(20.0))
        .sample_volume_flow(VolumeRate::new::<cubic_meter_per_second>(1.7e-11))
        .sheath_volume_flow(VolumeRate::new::<cubic_meter_per_second>(1.7e-10))
        .build()?;
    // ===========================================

    // ===========================================
    // Digitizer and trigger configuration. Shorthands are accepted wherever
    // the acquisition software would show them:
    let bit_depth: BitDepth = "12bit".parse()?;
    let threshold: Threshold = "5sigma".parse()?;
    // ===========================================

    let settings = SimulationSettings::default();
    println!("{}", serde_json::to_string_pretty(&settings)?);

    let mut cytometer = FlowCytometer::builder()
        .add_population(
            Population::builder()
                .name("beads")
                .diameter(Distribution::Normal {
                    mean: 400e-9,
                    std_dev: 10e-9,
                })
                .refractive_index(Distribution::Delta(1.59))
                .particle_count(ParticleCount::Concentration(1e14))
                .build(),
        )
        .add_population(
            Population::builder()
                .name("vesicles")
                .diameter(Distribution::LogNormal {
                    mu: (60e-9f64).ln(),
                    sigma: 0.3,
                })
                .refractive_index(Distribution::Delta(1.40))
                .particle_count(ParticleCount::Concentration(1e17))
                .sampling_method(SamplingMethod::gamma())
                .build(),
        )
        .add_detector(
            Detector::builder()
                .name("forward")
                .responsivity(0.7)
                .dark_current(ElectricCurrent::new::<nanoampere>(1.0))
                .coupling(RayleighCoupling::new(beam, 0.2, Angle::new::<degree>(10.0)))
                .build(),
        )
        .add_detector(
            Detector::builder()
                .name("side")
                .responsivity(0.7)
                .dark_current(ElectricCurrent::new::<nanoampere>(1.0))
                .coupling(RayleighCoupling::new(beam, 0.9, Angle::new::<degree>(90.0)))
                .build(),
        )
        .add_analog_filter(
            AnalogFilter::builder()
                .kind(FilterKind::Bessel)
                .band(Band::LowPass)
                .cutoff(2e6)
                .build(),
        )
        .flow_cell(flow_cell)
        .beam(beam)
        .background_power(Power::new::<microwatt>(0.1))
        .amplifier(
            TransimpedanceAmplifier::builder()
                .gain(ElectricalResistance::new::<ohm>(1e6))
                .bandwidth(Frequency::new::<megahertz>(5.0))
                .voltage_noise_density(1e-8)
                .current_noise_density(1e-13)
                .build(),
        )
        .digitizer(
            Digitizer::builder()
                .sampling_rate(Frequency::new::<megahertz>(10.0))
                .bit_depth(bit_depth)
                .build(),
        )
        .settings(settings)
        .baseline_restoration(true)
        .triggering_system(
            TriggeringSystem::builder()
                .trigger_detector("side")
                .scheme(TriggerScheme::DoubleThreshold)
                .threshold(threshold)
                .lower_threshold(Threshold::Sigma(2.0))
                .pre_buffer(32)
                .post_buffer(32)
                .min_duration(3)
                .build(),
        )
        .peak_locator(Box::new(
            ThresholdPeakLocator::builder()
                .distance(20)
                .max_number_of_peaks(3)
                .build(),
        ))
        .observer(())
        .build()?;

    let acquisition = cytometer.run(run_time, &mut StdRng::seed_from_u64(seed))?;

    println!("{}\n", event_summary(&acquisition.events));
    for (detector, capture) in &acquisition.capture {
        println!(
            "{detector}: range [{:.3e}, {:.3e}] V, clipped: {}",
            capture.min, capture.max, capture.clipped
        );
    }
    if let Some(peaks) = &acquisition.peaks {
        println!("\n{}", peak_summary(peaks));
    }

    Ok(())
}
