use facesym_vision::DetectedFace;

/// The face that gets scored: the first one in provider order.
///
/// The pipeline orders faces by detector confidence, so this is also the
/// most confident detection. Every other face is ignored for scoring.
pub fn first_face(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    faces.first()
}
