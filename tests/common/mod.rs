use abcpo::{
    AminoAcid, AntibodyCandidate, AntigenContext, DesignSpan, DiffusionModel, DiffusionSchedule,
    PlmEncoder, ResidueFrame, ScheduleKind,
};

#[cfg(test)]
#[allow(dead_code)]
pub fn simple_model() -> DiffusionModel {
    let encoder = PlmEncoder::new(8, 0).unwrap();
    let schedule = DiffusionSchedule::new(ScheduleKind::Cosine, 8).unwrap();
    DiffusionModel::new(encoder, schedule, 6, 1).unwrap()
}

/// A short charged epitope a few angstroms away from the antibody chain
#[cfg(test)]
#[allow(dead_code)]
pub fn simple_antigen() -> AntigenContext {
    AntigenContext::new(
        AminoAcid::from_string("KRWDE").unwrap(),
        (0..5)
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 6., 0.))
            .collect(),
    )
    .unwrap()
}

/// Ten-residue scaffold with a four-residue design span in the middle,
/// laid out as a straight chain facing the antigen
#[cfg(test)]
#[allow(dead_code)]
pub fn simple_scaffold() -> AntibodyCandidate {
    AntibodyCandidate::new(
        AminoAcid::from_string("EVQLVESGGG").unwrap(),
        (0..10)
            .map(|i| ResidueFrame::at_position(3.8 * i as f64, 0., 0.))
            .collect(),
        DesignSpan::new(3, 7).unwrap(),
    )
    .unwrap()
}
